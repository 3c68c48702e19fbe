//! Shared error types for the services crate.

use thiserror::Error;

use edu_core::model::{StudentId, StudentIdError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `ProgressAggregator`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error(transparent)]
    Validation(#[from] StudentIdError),
    #[error("could not refresh progress for {student_id}: {source}")]
    Fetch {
        student_id: StudentId,
        source: StorageError,
    },
    #[error("no student has been requested yet")]
    NoStudentSelected,
}

/// Errors emitted by `SupabaseProgressSource`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SupabaseError {
    #[error("supabase request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("could not decode supabase rows: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid row in {table}: {reason}")]
    InvalidRow { table: &'static str, reason: String },
}

impl From<SupabaseError> for StorageError {
    fn from(err: SupabaseError) -> Self {
        match &err {
            SupabaseError::HttpStatus(status) if *status == reqwest::StatusCode::NOT_FOUND => {
                StorageError::NotFound
            }
            SupabaseError::HttpStatus(_) | SupabaseError::Http(_) => {
                StorageError::Connection(err.to_string())
            }
            SupabaseError::Decode(_) | SupabaseError::InvalidRow { .. } => {
                StorageError::Serialization(err.to_string())
            }
        }
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
