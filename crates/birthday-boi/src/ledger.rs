//! Process-local record of which birthdays have already been announced.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

/// Identifies one announcement: a user in a guild on a given local day and
/// month, as resolved in that user's timezone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LedgerKey {
    pub guild_id: u64,
    pub user_id: u64,
    pub day: u32,
    pub month: u32,
}

/// Ledger shared between the periodic scan and the synchronous per-user
/// check. A std mutex keeps the has-announced check and the mark a single
/// non-interruptible step; no await may happen while it is held.
pub type SharedLedger = Arc<Mutex<AnnouncementLedger>>;

/// Tracks announced birthdays for the current UTC day.
///
/// Entries never expire individually; the whole ledger is cleared on the
/// first call after the UTC calendar date advances. State is in-memory
/// only, so a restart forgets the current day's announcements.
#[derive(Debug)]
pub struct AnnouncementLedger {
    announced: HashSet<LedgerKey>,
    last_reset: NaiveDate,
}

impl AnnouncementLedger {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            announced: HashSet::new(),
            last_reset: now.date_naive(),
        }
    }

    pub fn has_announced(&self, key: &LedgerKey) -> bool {
        self.announced.contains(key)
    }

    /// Idempotent; marking twice is the same as marking once.
    pub fn mark_announced(&mut self, key: LedgerKey) {
        self.announced.insert(key);
    }

    /// Removes a mark so a later scan tick can retry a failed send.
    pub fn retract(&mut self, key: &LedgerKey) {
        self.announced.remove(key);
    }

    /// Clears all entries the first time it is called after the UTC date of
    /// `now` has advanced past the UTC date of the last reset. The
    /// comparison is between calendar dates, not elapsed time.
    pub fn reset_if_new_day(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today > self.last_reset {
            info!(
                entries = self.announced.len(),
                %today,
                "New UTC day, clearing announcement ledger"
            );
            self.announced.clear();
            self.last_reset = today;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn key(user_id: u64) -> LedgerKey {
        LedgerKey {
            guild_id: 1,
            user_id,
            day: 15,
            month: 6,
        }
    }

    #[test]
    fn mark_is_idempotent() {
        let mut ledger = AnnouncementLedger::new(instant("2024-06-15T00:00:00Z"));
        ledger.mark_announced(key(1));
        ledger.mark_announced(key(1));
        assert!(ledger.has_announced(&key(1)));
        assert!(!ledger.has_announced(&key(2)));
    }

    #[test]
    fn same_day_does_not_reset() {
        let mut ledger = AnnouncementLedger::new(instant("2024-06-15T01:00:00Z"));
        ledger.mark_announced(key(1));

        ledger.reset_if_new_day(instant("2024-06-15T23:59:00Z"));
        assert!(ledger.has_announced(&key(1)));
    }

    #[test]
    fn new_utc_day_clears_everything() {
        let mut ledger = AnnouncementLedger::new(instant("2024-06-15T01:00:00Z"));
        ledger.mark_announced(key(1));
        ledger.mark_announced(key(2));

        // Just past UTC midnight, even by minutes, is a new day.
        ledger.reset_if_new_day(instant("2024-06-16T00:03:00Z"));
        assert!(!ledger.has_announced(&key(1)));
        assert!(!ledger.has_announced(&key(2)));
    }

    #[test]
    fn reset_compares_dates_not_elapsed_time() {
        let mut ledger = AnnouncementLedger::new(instant("2024-06-15T23:59:00Z"));
        ledger.mark_announced(key(1));

        // Two minutes later but a new calendar date.
        ledger.reset_if_new_day(instant("2024-06-16T00:01:00Z"));
        assert!(!ledger.has_announced(&key(1)));
    }

    #[test]
    fn retract_allows_reannouncement() {
        let mut ledger = AnnouncementLedger::new(instant("2024-06-15T00:00:00Z"));
        ledger.mark_announced(key(1));
        ledger.retract(&key(1));
        assert!(!ledger.has_announced(&key(1)));
    }
}
