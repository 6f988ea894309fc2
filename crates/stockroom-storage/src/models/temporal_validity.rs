//! Time-window validity shared by credential records.

use chrono::{DateTime, Utc};

/// Outcome of checking an entity against its validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Inactive,
    NotYetValid,
    Expired,
}

/// Entities with an active flag and an optional validity window.
///
/// Implementors provide the accessors; [`TemporalValidity::validity_at`]
/// supplies the check.
///
/// ```
/// use stockroom_storage::models::{TemporalValidity, Validity};
/// use chrono::{DateTime, Duration, Utc};
///
/// struct Badge {
///     until: DateTime<Utc>,
/// }
///
/// impl TemporalValidity for Badge {
///     fn is_active(&self) -> bool { true }
///     fn validity_start(&self) -> Option<DateTime<Utc>> { None }
///     fn validity_end(&self) -> Option<DateTime<Utc>> { Some(self.until) }
/// }
///
/// let now = Utc::now();
/// let badge = Badge { until: now - Duration::days(1) };
/// assert_eq!(badge.validity_at(now), Validity::Expired);
/// ```
pub trait TemporalValidity {
    /// Inactive entities are invalid regardless of their window.
    fn is_active(&self) -> bool;

    fn validity_start(&self) -> Option<DateTime<Utc>>;

    fn validity_end(&self) -> Option<DateTime<Utc>>;

    /// Classify the entity at instant `now`. Both window bounds are inclusive.
    fn validity_at(&self, now: DateTime<Utc>) -> Validity {
        if !self.is_active() {
            return Validity::Inactive;
        }

        if let Some(start) = self.validity_start()
            && now < start
        {
            return Validity::NotYetValid;
        }

        if let Some(end) = self.validity_end()
            && now > end
        {
            return Validity::Expired;
        }

        Validity::Valid
    }

    fn is_valid(&self) -> bool {
        self.validity_at(Utc::now()) == Validity::Valid
    }
}
