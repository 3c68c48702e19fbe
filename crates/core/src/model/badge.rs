use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::BadgeId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum BadgeError {
    #[error("badge id must not be empty")]
    EmptyId,
    #[error("badge name must not be empty")]
    EmptyName,
}

/// A badge a student has earned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BadgeFields")]
pub struct Badge {
    id: BadgeId,
    name: String,
    earned_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct BadgeFields {
    id: String,
    name: String,
    earned_at: DateTime<Utc>,
}

impl TryFrom<BadgeFields> for Badge {
    type Error = BadgeError;

    fn try_from(fields: BadgeFields) -> Result<Self, Self::Error> {
        Self::new(fields.id, fields.name, fields.earned_at)
    }
}

impl Badge {
    /// Creates a badge, trimming the name.
    ///
    /// # Errors
    ///
    /// Returns `BadgeError` if the id or name is blank.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        earned_at: DateTime<Utc>,
    ) -> Result<Self, BadgeError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(BadgeError::EmptyId);
        }
        let name = name.into().trim().to_owned();
        if name.is_empty() {
            return Err(BadgeError::EmptyName);
        }

        Ok(Self {
            id: BadgeId::new(id),
            name,
            earned_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> &BadgeId {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn earned_at(&self) -> DateTime<Utc> {
        self.earned_at
    }
}
