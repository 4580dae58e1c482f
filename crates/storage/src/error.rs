use std::path::PathBuf;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    #[snafu(display("failed to read store file at {path:?} on `{stage}`: {source}"))]
    ReadStore {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("store file at {path:?} is not a JSON string map: {source}"))]
    ParseStore {
        stage: &'static str,
        path: PathBuf,
        source: serde_json::Error,
    },
    #[snafu(display("failed to create store directory at {path:?} on `{stage}`: {source}"))]
    CreateDirectory {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize store contents on `{stage}`: {source}"))]
    SerializeStore {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write store file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to replace store file from {from:?} to {to:?} on `{stage}`: {source}"))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;
