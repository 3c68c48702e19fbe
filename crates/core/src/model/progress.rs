use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Badge, StudentId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ProgressEntryError {
    #[error("subject must not be empty")]
    EmptySubject,
    #[error("total lessons must be greater than zero")]
    NoLessons,
    #[error("completed lessons ({completed}) exceed total ({total})")]
    CompletedExceedsTotal { completed: u32, total: u32 },
    #[error("quiz score {0} is outside 0..=100")]
    QuizScoreOutOfRange(u8),
}

/// Progress of one student through one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ProgressEntryFields")]
pub struct ProgressEntry {
    subject: String,
    completed_lessons: u32,
    total_lessons: u32,
    quiz_score: Option<u8>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct ProgressEntryFields {
    subject: String,
    completed_lessons: u32,
    total_lessons: u32,
    #[serde(default)]
    quiz_score: Option<u8>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<ProgressEntryFields> for ProgressEntry {
    type Error = ProgressEntryError;

    fn try_from(fields: ProgressEntryFields) -> Result<Self, Self::Error> {
        Self::new(
            fields.subject,
            fields.completed_lessons,
            fields.total_lessons,
            fields.quiz_score,
            fields.updated_at,
        )
    }
}

impl ProgressEntry {
    /// Validates and builds a progress entry.
    ///
    /// # Errors
    ///
    /// Returns `ProgressEntryError` if the subject is blank, there are no
    /// lessons, completion exceeds the total, or the quiz score exceeds 100.
    pub fn new(
        subject: impl Into<String>,
        completed_lessons: u32,
        total_lessons: u32,
        quiz_score: Option<u8>,
        updated_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ProgressEntryError> {
        let subject = subject.into().trim().to_owned();
        if subject.is_empty() {
            return Err(ProgressEntryError::EmptySubject);
        }
        if total_lessons == 0 {
            return Err(ProgressEntryError::NoLessons);
        }
        if completed_lessons > total_lessons {
            return Err(ProgressEntryError::CompletedExceedsTotal {
                completed: completed_lessons,
                total: total_lessons,
            });
        }
        if let Some(score) = quiz_score {
            if score > 100 {
                return Err(ProgressEntryError::QuizScoreOutOfRange(score));
            }
        }

        Ok(Self {
            subject,
            completed_lessons,
            total_lessons,
            quiz_score,
            updated_at,
        })
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn completed_lessons(&self) -> u32 {
        self.completed_lessons
    }

    #[must_use]
    pub fn total_lessons(&self) -> u32 {
        self.total_lessons
    }

    #[must_use]
    pub fn quiz_score(&self) -> Option<u8> {
        self.quiz_score
    }

    #[must_use]
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Whole-number completion percentage, rounded down.
    #[must_use]
    pub fn percent_complete(&self) -> u8 {
        let pct = u64::from(self.completed_lessons) * 100 / u64::from(self.total_lessons);
        u8::try_from(pct).unwrap_or(100)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed_lessons == self.total_lessons
    }
}

/// Immutable view of one student's remote progress.
///
/// Snapshots are never merged; a newer fetch replaces the whole value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    student_id: StudentId,
    badges: Vec<Badge>,
    subject_progress: Vec<ProgressEntry>,
    fetched_at: DateTime<Utc>,
}

impl ProgressSnapshot {
    #[must_use]
    pub fn new(
        student_id: StudentId,
        badges: Vec<Badge>,
        subject_progress: Vec<ProgressEntry>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            student_id,
            badges,
            subject_progress,
            fetched_at,
        }
    }

    #[must_use]
    pub fn student_id(&self) -> &StudentId {
        &self.student_id
    }

    #[must_use]
    pub fn badges(&self) -> &[Badge] {
        &self.badges
    }

    #[must_use]
    pub fn subject_progress(&self) -> &[ProgressEntry] {
        &self.subject_progress
    }

    #[must_use]
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Mean completion across all subjects, or 0 when there are none.
    #[must_use]
    pub fn overall_percent(&self) -> u8 {
        if self.subject_progress.is_empty() {
            return 0;
        }
        let sum: u64 = self
            .subject_progress
            .iter()
            .map(|entry| u64::from(entry.percent_complete()))
            .sum();
        let count = self.subject_progress.len() as u64;
        u8::try_from(sum / count).unwrap_or(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn validates_entry_bounds() {
        assert_eq!(
            ProgressEntry::new(" ", 0, 1, None, None).unwrap_err(),
            ProgressEntryError::EmptySubject
        );
        assert_eq!(
            ProgressEntry::new("Math", 0, 0, None, None).unwrap_err(),
            ProgressEntryError::NoLessons
        );
        assert_eq!(
            ProgressEntry::new("Math", 5, 4, None, None).unwrap_err(),
            ProgressEntryError::CompletedExceedsTotal {
                completed: 5,
                total: 4
            }
        );
        assert_eq!(
            ProgressEntry::new("Math", 1, 4, Some(101), None).unwrap_err(),
            ProgressEntryError::QuizScoreOutOfRange(101)
        );
    }

    #[test]
    fn percent_complete_rounds_down() {
        let entry = ProgressEntry::new("Reading", 1, 3, Some(80), None).unwrap();
        assert_eq!(entry.percent_complete(), 33);
        assert!(!entry.is_complete());
    }

    #[test]
    fn overall_percent_averages_subjects() {
        let snapshot = ProgressSnapshot::new(
            StudentId::new("s1").unwrap(),
            Vec::new(),
            vec![
                ProgressEntry::new("Math", 2, 2, None, None).unwrap(),
                ProgressEntry::new("Science", 0, 4, None, None).unwrap(),
            ],
            fixed_now(),
        );
        assert_eq!(snapshot.overall_percent(), 50);

        let empty = ProgressSnapshot::new(
            StudentId::new("s1").unwrap(),
            Vec::new(),
            Vec::new(),
            fixed_now(),
        );
        assert_eq!(empty.overall_percent(), 0);
    }

    #[test]
    fn deserialize_applies_entry_validation() {
        let err = serde_json::from_str::<ProgressEntry>(
            r#"{"subject":"Math","completed_lessons":5,"total_lessons":0,"quiz_score":null}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("total lessons must be greater than zero"));

        let blank_subject = r#"{"subject":"","completed_lessons":0,"total_lessons":3}"#;
        assert!(serde_json::from_str::<ProgressEntry>(blank_subject).is_err());

        let bad_score =
            r#"{"subject":"Math","completed_lessons":1,"total_lessons":3,"quiz_score":250}"#;
        assert!(serde_json::from_str::<ProgressEntry>(bad_score).is_err());
    }

    #[test]
    fn snapshot_serialization_round_trips_valid_entries() {
        let snapshot = ProgressSnapshot::new(
            StudentId::new("s1").unwrap(),
            vec![Badge::new("b1", "Starter", fixed_now()).unwrap()],
            vec![ProgressEntry::new("Math", 2, 4, Some(70), None).unwrap()],
            fixed_now(),
        );
        let json = serde_json::to_string(&snapshot).unwrap();
        let decoded: ProgressSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, snapshot);
        assert_eq!(decoded.overall_percent(), 50);
    }
}
