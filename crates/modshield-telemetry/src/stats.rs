//! Daily scan statistics

use chrono::{NaiveDate, Timelike, Utc};
use modshield_core::{Result, StateStore, StateStoreExt, UserId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

/// Store key the current day's statistics are persisted under
pub const STATS_KEY: &str = "daily_stats";

/// Point-in-time view of one day's statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Day the counters belong to
    pub date: NaiveDate,
    /// Messages scanned
    pub scanned: u64,
    /// Messages that produced a violation
    pub flagged: u64,
    /// Distinct authors with a violation
    pub users_caught: BTreeSet<UserId>,
    /// Scans per hour of day
    pub hourly: [u64; 24],
}

impl StatsSnapshot {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            scanned: 0,
            flagged: 0,
            users_caught: BTreeSet::new(),
            hourly: [0; 24],
        }
    }

    /// Flagged share of scanned messages, in percent
    pub fn flag_rate(&self) -> f64 {
        if self.scanned == 0 {
            0.0
        } else {
            self.flagged as f64 / self.scanned as f64 * 100.0
        }
    }

    /// Busiest hour, if anything was scanned. Ties go to the earlier hour.
    pub fn peak_hour(&self) -> Option<u32> {
        let (hour, count) = self
            .hourly
            .iter()
            .enumerate()
            .fold((0, 0), |best, (h, &c)| if c > best.1 { (h, c) } else { best });
        (count > 0).then_some(hour as u32)
    }

    /// Number of distinct authors caught
    pub fn unique_users(&self) -> usize {
        self.users_caught.len()
    }
}

/// Scan counters for the current day
#[derive(Debug)]
pub struct DailyStats {
    current: Mutex<StatsSnapshot>,
}

impl DailyStats {
    /// Start counting for `date`
    pub fn new(date: NaiveDate) -> Self {
        Self {
            current: Mutex::new(StatsSnapshot::empty(date)),
        }
    }

    /// Start counting for today (UTC)
    pub fn today() -> Self {
        Self::new(Utc::now().date_naive())
    }

    /// Restore a saved day, or start fresh if none was saved
    pub fn load(store: &dyn StateStore) -> Result<Self> {
        Ok(match store.load_as::<StatsSnapshot>(STATS_KEY)? {
            Some(snapshot) => Self {
                current: Mutex::new(snapshot),
            },
            None => Self::today(),
        })
    }

    /// Persist the current day
    pub fn save(&self, store: &dyn StateStore) -> Result<()> {
        store.save_as(STATS_KEY, &self.snapshot())
    }

    /// Count a scan at an hour of day (0-23)
    pub fn record_scan_at(&self, hour: u32) {
        let mut current = self.current.lock();
        current.scanned += 1;
        current.hourly[(hour % 24) as usize] += 1;
    }

    /// Count a scan now
    pub fn record_scan(&self) {
        self.record_scan_at(Utc::now().hour());
    }

    /// Count a flagged message
    pub fn record_flag(&self, user_id: UserId) {
        let mut current = self.current.lock();
        current.flagged += 1;
        current.users_caught.insert(user_id);
    }

    /// Current counters
    pub fn snapshot(&self) -> StatsSnapshot {
        self.current.lock().clone()
    }

    /// Start a new day, returning the finished one
    pub fn reset(&self, date: NaiveDate) -> StatsSnapshot {
        let finished = std::mem::replace(&mut *self.current.lock(), StatsSnapshot::empty(date));
        info!(
            date = %finished.date,
            scanned = finished.scanned,
            flagged = finished.flagged,
            "Daily statistics rolled over"
        );
        finished
    }

    /// Roll over if `today` is past the tracked date
    pub fn roll_over(&self, today: NaiveDate) -> Option<StatsSnapshot> {
        let stale = self.current.lock().date < today;
        stale.then(|| self.reset(today))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modshield_core::MemoryStore;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn test_counts_and_rates() {
        let stats = DailyStats::new(day(1));
        for hour in [9, 14, 14, 14, 22] {
            stats.record_scan_at(hour);
        }
        stats.record_flag(10);
        stats.record_flag(10);
        stats.record_flag(11);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.scanned, 5);
        assert_eq!(snapshot.flagged, 3);
        assert_eq!(snapshot.unique_users(), 2);
        assert_eq!(snapshot.peak_hour(), Some(14));
        assert!((snapshot.flag_rate() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_day() {
        let snapshot = DailyStats::new(day(1)).snapshot();
        assert_eq!(snapshot.peak_hour(), None);
        assert_eq!(snapshot.flag_rate(), 0.0);
    }

    #[test]
    fn test_roll_over() {
        let stats = DailyStats::new(day(1));
        stats.record_scan_at(3);

        assert!(stats.roll_over(day(1)).is_none());
        let finished = stats.roll_over(day(2)).unwrap();
        assert_eq!(finished.scanned, 1);
        assert_eq!(stats.snapshot().date, day(2));
        assert_eq!(stats.snapshot().scanned, 0);
    }

    #[test]
    fn test_persistence() {
        let store = MemoryStore::new();
        let stats = DailyStats::new(day(4));
        stats.record_scan_at(1);
        stats.record_flag(5);
        stats.save(&store).unwrap();

        let restored = DailyStats::load(&store).unwrap();
        assert_eq!(restored.snapshot(), stats.snapshot());
    }
}
