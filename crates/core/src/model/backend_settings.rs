use thiserror::Error;
use url::Url;

/// Connection details for the remote progress backend (Supabase).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendSettings {
    base_url: Url,
    anon_key: String,
}

#[derive(Clone, Debug, Default)]
pub struct BackendSettingsDraft {
    pub base_url: Option<String>,
    pub anon_key: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum BackendSettingsError {
    #[error("backend URL is not configured")]
    MissingBaseUrl,
    #[error("backend key is not configured")]
    MissingKey,
    #[error("invalid backend URL")]
    InvalidBaseUrl,
}

impl BackendSettingsDraft {
    /// Validate and normalize the draft.
    ///
    /// # Errors
    ///
    /// Returns `BackendSettingsError` if either value is missing or the URL
    /// is not an absolute http(s) URL.
    pub fn validate(self) -> Result<BackendSettings, BackendSettingsError> {
        let base_url =
            normalize_optional(self.base_url).ok_or(BackendSettingsError::MissingBaseUrl)?;
        let anon_key = normalize_optional(self.anon_key).ok_or(BackendSettingsError::MissingKey)?;

        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|_| BackendSettingsError::InvalidBaseUrl)?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(BackendSettingsError::InvalidBaseUrl);
        }

        Ok(BackendSettings { base_url, anon_key })
    }
}

impl BackendSettings {
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    /// Builds the PostgREST endpoint URL for a table.
    #[must_use]
    pub fn rest_url(&self, table: &str) -> String {
        format!(
            "{}/rest/v1/{table}",
            self.base_url.as_str().trim_end_matches('/')
        )
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}
