use std::env;
use std::time::Duration;

use async_trait::async_trait;
use edu_core::model::{
    Badge, BackendSettings, BackendSettingsDraft, BackendSettingsError, ProgressEntry, StudentId,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use storage::repository::{BadgeRecord, ProgressRecord, ProgressSource, StorageError};

use crate::error::SupabaseError;

const BADGES_TABLE: &str = "student_badges";
const PROGRESS_TABLE: &str = "subject_progress";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Reads `EDU_SUPABASE_URL` and `EDU_SUPABASE_ANON_KEY`.
///
/// # Errors
///
/// Returns `BackendSettingsError` if either variable is missing or the URL
/// is invalid.
pub fn settings_from_env() -> Result<BackendSettings, BackendSettingsError> {
    BackendSettingsDraft {
        base_url: env::var("EDU_SUPABASE_URL").ok(),
        anon_key: env::var("EDU_SUPABASE_ANON_KEY").ok(),
    }
    .validate()
}

/// `ProgressSource` backed by the Supabase PostgREST API.
#[derive(Clone)]
pub struct SupabaseProgressSource {
    client: Client,
    settings: BackendSettings,
}

impl SupabaseProgressSource {
    /// # Errors
    ///
    /// Returns `reqwest::Error` if the HTTP client cannot be built.
    pub fn new(settings: BackendSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, settings })
    }

    async fn fetch_rows<T: DeserializeOwned>(
        &self,
        table: &'static str,
        student_id: &StudentId,
        order: &str,
    ) -> Result<Vec<T>, SupabaseError> {
        let response = self
            .client
            .get(self.settings.rest_url(table))
            .header("apikey", self.settings.anon_key())
            .bearer_auth(self.settings.anon_key())
            .query(&[
                ("select", "*".to_string()),
                ("student_id", format!("eq.{student_id}")),
                ("order", order.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SupabaseError::HttpStatus(response.status()));
        }

        let body = response.bytes().await?;
        let rows = serde_json::from_slice(&body)?;
        Ok(rows)
    }
}

/// Validate decoded badge rows.
///
/// # Errors
///
/// Returns `SupabaseError::InvalidRow` for the first row that fails validation.
pub fn decode_badges(records: Vec<BadgeRecord>) -> Result<Vec<Badge>, SupabaseError> {
    records
        .into_iter()
        .map(|record| {
            record.into_badge().map_err(|err| SupabaseError::InvalidRow {
                table: BADGES_TABLE,
                reason: err.to_string(),
            })
        })
        .collect()
}

/// Validate decoded subject-progress rows.
///
/// # Errors
///
/// Returns `SupabaseError::InvalidRow` for the first row that fails validation.
pub fn decode_progress(records: Vec<ProgressRecord>) -> Result<Vec<ProgressEntry>, SupabaseError> {
    records
        .into_iter()
        .map(|record| {
            record.into_entry().map_err(|err| SupabaseError::InvalidRow {
                table: PROGRESS_TABLE,
                reason: err.to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl ProgressSource for SupabaseProgressSource {
    async fn get_badges(&self, student_id: &StudentId) -> Result<Vec<Badge>, StorageError> {
        let records: Vec<BadgeRecord> = self
            .fetch_rows(BADGES_TABLE, student_id, "earned_at.asc")
            .await?;
        Ok(decode_badges(records)?)
    }

    async fn get_subject_progress(
        &self,
        student_id: &StudentId,
    ) -> Result<Vec<ProgressEntry>, StorageError> {
        let records: Vec<ProgressRecord> = self
            .fetch_rows(PROGRESS_TABLE, student_id, "subject.asc")
            .await?;
        Ok(decode_progress(records)?)
    }
}
