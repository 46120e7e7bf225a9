//! Sync window calculation
//!
//! The order feeds cover a trailing window: from the start of day N days back
//! through the end of yesterday, computed in the marketplace's home timezone
//! (Europe/Moscow) and carried as UTC everywhere else. Today is excluded so
//! the window only contains closed days.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Europe::Moscow;

/// UTC bounds of one sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub date_from: DateTime<Utc>,
    pub date_to: DateTime<Utc>,
}

impl SyncWindow {
    /// Trailing window ending yesterday (Moscow time), `days` days long.
    pub fn trailing_days(days: i64) -> Self {
        Self::trailing_days_at(days, Utc::now())
    }

    /// As [`SyncWindow::trailing_days`], anchored at an explicit instant.
    pub fn trailing_days_at(days: i64, now: DateTime<Utc>) -> Self {
        let today = now.with_timezone(&Moscow).date_naive();

        let from_naive = (today - Duration::days(days))
            .and_time(NaiveTime::MIN);
        let to_naive = (today - Duration::days(1))
            .and_hms_milli_opt(23, 59, 59, 999)
            .unwrap_or_else(|| (today - Duration::days(1)).and_time(NaiveTime::MIN));

        // Moscow has no DST transitions; earliest() only disambiguates the
        // theoretical ambiguous case.
        let date_from = Moscow
            .from_local_datetime(&from_naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(now);
        let date_to = Moscow
            .from_local_datetime(&to_naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(now);

        Self { date_from, date_to }
    }

    /// Trailing window in plain UTC midnights, the Ozon convention: from
    /// midnight `days` back through midnight today.
    pub fn trailing_days_utc(days: i64) -> Self {
        Self::trailing_days_utc_at(days, Utc::now())
    }

    /// As [`SyncWindow::trailing_days_utc`], anchored at an explicit instant.
    pub fn trailing_days_utc_at(days: i64, now: DateTime<Utc>) -> Self {
        let midnight = now
            .date_naive()
            .and_time(NaiveTime::MIN)
            .and_utc();

        Self {
            date_from: midnight - Duration::days(days),
            date_to: midnight,
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.date_from && instant <= self.date_to
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_trailing_days_excludes_today() {
        // 2024-06-15 12:00 Moscow == 09:00 UTC
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 9, 0, 0).unwrap();
        let window = SyncWindow::trailing_days_at(30, now);

        // From: 2024-05-16 00:00 Moscow == 2024-05-15 21:00 UTC
        assert_eq!(
            window.date_from,
            Utc.with_ymd_and_hms(2024, 5, 15, 21, 0, 0).unwrap()
        );
        // To: 2024-06-14 23:59:59.999 Moscow == 20:59:59.999 UTC
        assert_eq!(
            window.date_to,
            Utc.with_ymd_and_hms(2024, 6, 14, 20, 59, 59).unwrap()
                + Duration::milliseconds(999)
        );

        // A record from today must fall outside the window.
        assert!(!window.contains(now));
        assert!(window.contains(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()));
    }

    #[test]
    fn test_trailing_days_utc_is_midnight_aligned() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 17, 45, 0).unwrap();
        let window = SyncWindow::trailing_days_utc_at(30, now);

        assert_eq!(
            window.date_from,
            Utc.with_ymd_and_hms(2024, 5, 16, 0, 0, 0).unwrap()
        );
        assert_eq!(
            window.date_to,
            Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_window_boundaries_are_inclusive() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 9, 0, 0).unwrap();
        let window = SyncWindow::trailing_days_at(30, now);

        assert!(window.contains(window.date_from));
        assert!(window.contains(window.date_to));
    }
}
