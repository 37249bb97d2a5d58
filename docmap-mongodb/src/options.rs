//! Conversions from docmap inputs to driver options and from driver errors to
//! [`DocMapError`].

use mongodb::{
    IndexModel,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{
        CountOptions, FindOneAndDeleteOptions, FindOneAndUpdateOptions, FindOneOptions,
        FindOptions, IndexOptions, ReturnDocument as MongoReturnDocument, UpdateModifications,
    },
};

use docmap_core::{
    error::DocMapError,
    index::IndexSpec,
    query::{OperationOptions, ReturnDocument, UpdateSpec},
};

/// Server error code for unique index violations.
const DUPLICATE_KEY: i32 = 11000;

pub(crate) fn find_options(options: OperationOptions) -> FindOptions {
    let mut find = FindOptions::default();
    find.projection = options.projection;
    find.sort = options.sort;
    find.skip = options.skip;
    find.limit = options.limit;
    find
}

pub(crate) fn find_one_options(options: OperationOptions) -> FindOneOptions {
    let mut find = FindOneOptions::default();
    find.projection = options.projection;
    find.sort = options.sort;
    find.skip = options.skip;
    find
}

pub(crate) fn find_one_and_update_options(options: OperationOptions) -> FindOneAndUpdateOptions {
    let mut update = FindOneAndUpdateOptions::default();
    update.projection = options.projection;
    update.sort = options.sort;
    update.upsert = options.upsert;
    update.return_document = options.return_document.map(|image| match image {
        ReturnDocument::Before => MongoReturnDocument::Before,
        ReturnDocument::After => MongoReturnDocument::After,
    });
    update
}

pub(crate) fn find_one_and_delete_options(options: OperationOptions) -> FindOneAndDeleteOptions {
    let mut delete = FindOneAndDeleteOptions::default();
    delete.projection = options.projection;
    delete.sort = options.sort;
    delete
}

pub(crate) fn count_options(options: OperationOptions) -> CountOptions {
    let mut count = CountOptions::default();
    count.skip = options.skip;
    count.limit = options.limit.map(i64::unsigned_abs);
    count
}

pub(crate) fn update_modifications(update: UpdateSpec) -> UpdateModifications {
    match update {
        UpdateSpec::Document(document) => UpdateModifications::Document(document),
        UpdateSpec::Pipeline(stages) => UpdateModifications::Pipeline(stages),
    }
}

pub(crate) fn index_model(index: IndexSpec) -> IndexModel {
    let name = index.name();

    let mut options = IndexOptions::default();
    options.name = Some(name);
    options.unique = index.unique.then_some(true);
    options.sparse = index.sparse.then_some(true);

    IndexModel::builder().keys(index.keys).options(options).build()
}

/// Maps a driver error, recognising unique index violations on `namespace`.
pub(crate) fn map_error(err: MongoError, namespace: &str) -> DocMapError {
    let duplicate = match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY => {
            Some(write.message.clone())
        }
        ErrorKind::Command(command) if command.code == DUPLICATE_KEY => Some(command.message.clone()),
        _ => None,
    };

    match duplicate {
        Some(message) => DocMapError::DuplicateKey { collection: namespace.to_string(), message },
        None => DocMapError::Backend(err.to_string()),
    }
}
