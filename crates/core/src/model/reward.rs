/// Durable storage key holding the star counter as a decimal string.
pub const REWARD_STORAGE_KEY: &str = "eduAppStars";

/// Star counter earned by completing lessons and quizzes.
///
/// The total is normally non-negative, but the lower bound is not enforced:
/// a negative persisted value is loaded as-is and `add` accepts negative
/// amounts, so the total may drop below zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewardCounter {
    value: i64,
}

impl RewardCounter {
    #[must_use]
    pub fn new(value: i64) -> Self {
        Self { value }
    }

    /// Parses the persisted decimal form, or `None` if it is not a whole number.
    #[must_use]
    pub fn from_persisted(raw: &str) -> Option<Self> {
        raw.trim().parse::<i64>().ok().map(Self::new)
    }

    #[must_use]
    pub fn value(&self) -> i64 {
        self.value
    }

    /// Adds `amount`, saturating at the integer bounds, and returns the new total.
    pub fn add(&mut self, amount: i64) -> i64 {
        self.value = self.value.saturating_add(amount);
        self.value
    }

    #[must_use]
    pub fn to_persisted(&self) -> String {
        self.value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_persisted_rejects_non_integers() {
        assert_eq!(RewardCounter::from_persisted(""), None);
        assert_eq!(RewardCounter::from_persisted("12.5"), None);
        assert_eq!(RewardCounter::from_persisted("NaN"), None);
        assert_eq!(RewardCounter::from_persisted(" 42 "), Some(RewardCounter::new(42)));
    }

    #[test]
    fn from_persisted_keeps_negative_totals() {
        assert_eq!(RewardCounter::from_persisted("-5").map(|c| c.value()), Some(-5));
    }

    #[test]
    fn add_accepts_negative_amounts() {
        let mut counter = RewardCounter::new(3);
        assert_eq!(counter.add(5), 8);
        assert_eq!(counter.add(-10), -2);
        assert_eq!(counter.to_persisted(), "-2");
    }
}
