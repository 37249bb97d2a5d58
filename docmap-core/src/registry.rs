//! Alias to database binding registry.
//!
//! A [`Registry`] maps aliases to database handles, separately for each [`Mode`], with
//! exactly one default alias per configured mode. It is configured exactly once:
//! [`Registry::configure`] validates the whole binding list on a private table and then
//! commits it in a single atomic step, so a rejected list leaves the registry untouched
//! and a second (or concurrent) configuration fails fast.
//!
//! `Registry::new` is `const`, which lets a process keep one registry in a `static`
//! while still passing it explicitly to every operation:
//!
//! ```ignore
//! use docmap::registry::{DatabaseBinding, Registry};
//!
//! static REGISTRY: Registry = Registry::new();
//!
//! REGISTRY.configure(vec![
//!     DatabaseBinding::new("main", handle).as_default(),
//! ])?;
//! ```

use std::{collections::BTreeMap, sync::OnceLock};
use tracing::{debug, info};

use crate::{
    backend::{DatabaseHandle, Mode},
    error::{DocMapError, DocMapResult},
};

/// A database handle registered under an alias.
#[derive(Debug, Clone)]
pub struct DatabaseBinding {
    alias: String,
    handle: DatabaseHandle,
    is_default: bool,
}

impl DatabaseBinding {
    /// Creates a non-default binding. Its mode is the mode of `handle`.
    pub fn new(alias: impl Into<String>, handle: DatabaseHandle) -> Self {
        Self { alias: alias.into(), handle, is_default: false }
    }

    /// Marks this binding as the default of its mode.
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn handle(&self) -> &DatabaseHandle {
        &self.handle
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn mode(&self) -> Mode {
        self.handle.mode()
    }
}

#[derive(Debug, Clone, Default)]
struct ModeTable {
    bindings: BTreeMap<String, DatabaseBinding>,
    default_alias: Option<String>,
}

/// Per-mode alias tables returned by [`Registry::configure`].
#[derive(Debug, Clone, Default)]
pub struct ConfiguredDatabases {
    tables: BTreeMap<Mode, BTreeMap<String, DatabaseBinding>>,
}

impl ConfiguredDatabases {
    /// Returns the alias table of `mode` (empty when the mode has no bindings).
    pub fn mode(&self, mode: Mode) -> BTreeMap<String, DatabaseBinding> {
        self.tables.get(&mode).cloned().unwrap_or_default()
    }

    /// Returns the total number of bindings across modes.
    pub fn len(&self) -> usize {
        self.tables.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Registry of database bindings, configured exactly once.
#[derive(Debug, Default)]
pub struct Registry {
    tables: OnceLock<BTreeMap<Mode, ModeTable>>,
}

impl Registry {
    /// Creates an empty, unconfigured registry.
    pub const fn new() -> Self {
        Self { tables: OnceLock::new() }
    }

    /// Returns `true` once [`configure`](Self::configure) has succeeded.
    pub fn is_configured(&self) -> bool {
        self.tables.get().is_some()
    }

    /// Validates and commits the binding list.
    ///
    /// # Errors
    ///
    /// - [`DocMapError::AlreadyConfigured`] if the registry holds a configuration
    /// - [`DocMapError::InvalidArgument`] if `databases` is empty
    /// - [`DocMapError::DuplicateAlias`] if an alias repeats within or across modes
    /// - [`DocMapError::MultipleDefaults`] if a mode has more than one default
    /// - [`DocMapError::NoDefault`] if a mode with bindings has no default
    ///
    /// On error nothing is committed.
    pub fn configure(&self, databases: Vec<DatabaseBinding>) -> DocMapResult<ConfiguredDatabases> {
        if self.is_configured() {
            return Err(DocMapError::AlreadyConfigured);
        }

        if databases.is_empty() {
            return Err(DocMapError::InvalidArgument("DataBase list is empty".to_string()));
        }

        let mut tables: BTreeMap<Mode, ModeTable> = BTreeMap::new();

        for binding in databases {
            if tables
                .values()
                .any(|table| table.bindings.contains_key(binding.alias()))
            {
                return Err(DocMapError::DuplicateAlias(binding.alias));
            }

            let mode = binding.mode();
            let table = tables.entry(mode).or_default();

            if binding.is_default {
                if table.default_alias.is_some() {
                    return Err(DocMapError::MultipleDefaults(mode));
                }
                table.default_alias = Some(binding.alias.clone());
            }

            table
                .bindings
                .insert(binding.alias.clone(), binding);
        }

        if let Some((mode, _)) = tables
            .iter()
            .find(|(_, table)| table.default_alias.is_none())
        {
            return Err(DocMapError::NoDefault(*mode));
        }

        self.tables
            .set(tables)
            .map_err(|_| DocMapError::AlreadyConfigured)?;

        let configured = self.snapshot();

        info!(
            databases = configured.len(),
            sync_default = ?self.default_alias(Mode::Sync),
            async_default = ?self.default_alias(Mode::Async),
            "database registry configured"
        );

        Ok(configured)
    }

    /// Looks up a binding by alias, or the mode's default binding when `alias` is `None`.
    ///
    /// Returns `Ok(None)` when an explicit alias is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`DocMapError::NoDefaultConfigured`] for a default lookup on a mode
    /// without a default binding.
    pub fn lookup(&self, mode: Mode, alias: Option<&str>) -> DocMapResult<Option<DatabaseBinding>> {
        let table = self
            .tables
            .get()
            .and_then(|tables| tables.get(&mode));

        let alias = match alias {
            Some(alias) => alias,
            None => table
                .and_then(|table| table.default_alias.as_deref())
                .ok_or(DocMapError::NoDefaultConfigured(mode))?,
        };

        debug!(%mode, alias, "registry lookup");

        Ok(table.and_then(|table| table.bindings.get(alias).cloned()))
    }

    /// Returns a copy of the alias table of `mode`.
    pub fn list(&self, mode: Mode) -> BTreeMap<String, DatabaseBinding> {
        self.tables
            .get()
            .and_then(|tables| tables.get(&mode))
            .map(|table| table.bindings.clone())
            .unwrap_or_default()
    }

    /// Returns the default alias of `mode`, if configured.
    pub fn default_alias(&self, mode: Mode) -> Option<&str> {
        self.tables
            .get()
            .and_then(|tables| tables.get(&mode))
            .and_then(|table| table.default_alias.as_deref())
    }

    fn snapshot(&self) -> ConfiguredDatabases {
        ConfiguredDatabases {
            tables: [Mode::Sync, Mode::Async]
                .into_iter()
                .map(|mode| (mode, self.list(mode)))
                .filter(|(_, table)| !table.is_empty())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::testing::StubDatabase;

    fn sync_binding(alias: &str) -> DatabaseBinding {
        DatabaseBinding::new(alias, StubDatabase::sync_handle(alias))
    }

    fn async_binding(alias: &str) -> DatabaseBinding {
        DatabaseBinding::new(alias, StubDatabase::async_handle(alias))
    }

    #[test]
    fn configure_groups_bindings_by_mode() {
        let registry = Registry::new();

        let configured = registry
            .configure(vec![
                sync_binding("main").as_default(),
                sync_binding("archive"),
                async_binding("events").as_default(),
            ])
            .unwrap();

        assert_eq!(configured.len(), 3);
        assert_eq!(
            configured.mode(Mode::Sync).keys().collect::<Vec<_>>(),
            vec!["archive", "main"]
        );
        assert_eq!(configured.mode(Mode::Async).len(), 1);
        assert!(registry.is_configured());
    }

    #[test]
    fn configuring_twice_fails() {
        let registry = Registry::new();
        registry
            .configure(vec![sync_binding("main").as_default()])
            .unwrap();

        let err = registry
            .configure(vec![async_binding("other").as_default()])
            .unwrap_err();

        assert!(matches!(err, DocMapError::AlreadyConfigured));
        assert!(registry.list(Mode::Async).is_empty());
    }

    #[test]
    fn empty_binding_list_is_rejected() {
        let registry = Registry::new();

        assert!(matches!(
            registry.configure(Vec::new()),
            Err(DocMapError::InvalidArgument(_))
        ));
        assert!(!registry.is_configured());
    }

    #[rstest]
    #[case::same_mode(vec![sync_binding("main").as_default(), sync_binding("main")])]
    #[case::cross_mode(vec![sync_binding("main").as_default(), async_binding("main").as_default()])]
    fn duplicate_aliases_are_rejected(#[case] bindings: Vec<DatabaseBinding>) {
        let registry = Registry::new();

        let err = registry.configure(bindings).unwrap_err();

        assert!(matches!(err, DocMapError::DuplicateAlias(alias) if alias == "main"));
    }

    #[rstest]
    #[case::two_sync_defaults(
        vec![sync_binding("a").as_default(), sync_binding("b").as_default()],
        Mode::Sync
    )]
    #[case::two_async_defaults(
        vec![sync_binding("a").as_default(), async_binding("b").as_default(), async_binding("c").as_default()],
        Mode::Async
    )]
    fn multiple_defaults_leave_registry_untouched(
        #[case] bindings: Vec<DatabaseBinding>,
        #[case] mode: Mode,
    ) {
        let registry = Registry::new();

        let err = registry.configure(bindings).unwrap_err();

        assert!(matches!(err, DocMapError::MultipleDefaults(m) if m == mode));
        assert!(!registry.is_configured());
        assert!(registry.list(Mode::Sync).is_empty());
        assert!(registry.list(Mode::Async).is_empty());
    }

    #[rstest]
    #[case::sync_without_default(vec![sync_binding("a"), async_binding("b").as_default()], Mode::Sync)]
    #[case::async_without_default(vec![sync_binding("a").as_default(), async_binding("b")], Mode::Async)]
    fn a_mode_without_default_is_rejected(
        #[case] bindings: Vec<DatabaseBinding>,
        #[case] mode: Mode,
    ) {
        let registry = Registry::new();

        let err = registry.configure(bindings).unwrap_err();

        assert!(matches!(err, DocMapError::NoDefault(m) if m == mode));
        assert!(!registry.is_configured());
    }

    #[test]
    fn failed_configuration_can_be_retried() {
        let registry = Registry::new();
        assert!(registry.configure(vec![sync_binding("a")]).is_err());

        registry
            .configure(vec![sync_binding("a").as_default()])
            .unwrap();

        assert_eq!(registry.default_alias(Mode::Sync), Some("a"));
    }

    #[test]
    fn default_lookup_returns_default_binding() {
        let registry = Registry::new();
        registry
            .configure(vec![
                sync_binding("archive"),
                sync_binding("main").as_default(),
            ])
            .unwrap();

        let binding = registry.lookup(Mode::Sync, None).unwrap().unwrap();

        assert_eq!(binding.alias(), "main");
        assert!(binding.is_default());
        assert_eq!(
            registry
                .lookup(Mode::Sync, Some("archive"))
                .unwrap()
                .unwrap()
                .alias(),
            "archive"
        );
        assert!(registry.lookup(Mode::Sync, Some("missing")).unwrap().is_none());
    }

    #[test]
    fn default_lookup_without_default_fails() {
        let registry = Registry::new();
        assert!(matches!(
            registry.lookup(Mode::Sync, None),
            Err(DocMapError::NoDefaultConfigured(Mode::Sync))
        ));

        registry
            .configure(vec![sync_binding("main").as_default()])
            .unwrap();

        assert!(matches!(
            registry.lookup(Mode::Async, None),
            Err(DocMapError::NoDefaultConfigured(Mode::Async))
        ));
    }

    #[test]
    fn list_returns_an_independent_snapshot() {
        let registry = Registry::new();
        registry
            .configure(vec![sync_binding("main").as_default()])
            .unwrap();

        let mut listed = registry.list(Mode::Sync);
        listed.clear();

        assert_eq!(registry.list(Mode::Sync).len(), 1);
    }

    #[test]
    fn concurrent_configuration_commits_once() {
        let registry = Registry::new();

        let successes = std::thread::scope(|scope| {
            let handles = (0..8)
                .map(|i| {
                    let registry = &registry;
                    scope.spawn(move || {
                        registry
                            .configure(vec![sync_binding(&format!("db{i}")).as_default()])
                            .is_ok()
                    })
                })
                .collect::<Vec<_>>();

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .filter(|ok| *ok)
                .count()
        });

        assert_eq!(successes, 1);
        assert_eq!(registry.list(Mode::Sync).len(), 1);
    }
}
