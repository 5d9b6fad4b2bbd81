//! Calendar-month partitions and deterministic archive keys
//!
//! A backup run's date range is tiled by half-open month windows:
//! `[first-of-month, first-of-next-month)`. Consecutive windows never
//! overlap, so every row timestamp falls in exactly one window. Each
//! archived batch within a window is addressed by an [`ArchiveKey`] whose
//! object path is byte-identical across calls and across runs.

use chrono::{Datelike, Months, NaiveDate};
use std::fmt;

use crate::{ArchiveError, Result};

/// One calendar month's half-open timestamp range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthWindow {
    start: NaiveDate,
}

impl MonthWindow {
    /// The window containing the given date.
    pub fn of(date: NaiveDate) -> Self {
        // with_day(1) cannot fail for a valid date
        Self {
            start: date.with_day(1).unwrap_or(date),
        }
    }

    /// Parse a `YYYY-MM` label.
    pub fn from_label(label: &str) -> Result<Self> {
        let parsed = NaiveDate::parse_from_str(&format!("{}-01", label), "%Y-%m-%d")
            .map_err(|_| ArchiveError::BadDate(label.to_string()))?;
        Ok(Self::of(parsed))
    }

    /// Inclusive lower bound: first day of the month.
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Exclusive upper bound: first day of the following month.
    pub fn end_exclusive(&self) -> NaiveDate {
        self.start
            .checked_add_months(Months::new(1))
            .unwrap_or(self.start)
    }

    pub fn year(&self) -> i32 {
        self.start.year()
    }

    pub fn month(&self) -> u32 {
        self.start.month()
    }

    /// `YYYY-MM`, zero-padded.
    pub fn label(&self) -> String {
        format!("{}-{:02}", self.year(), self.month())
    }

    pub fn next(&self) -> Self {
        Self {
            start: self.end_exclusive(),
        }
    }

    /// Whether a date falls inside this window's half-open range.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start() && date < self.end_exclusive()
    }
}

impl fmt::Display for MonthWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// The month windows tiling `[start, end]`, in calendar order.
///
/// Returns one window per calendar month touched by the range; empty when
/// `start > end`.
pub fn windows_for_range(start: NaiveDate, end: NaiveDate) -> Vec<MonthWindow> {
    let mut windows = Vec::new();
    let mut window = MonthWindow::of(start);
    while window.start() <= end {
        windows.push(window);
        window = window.next();
    }
    windows
}

/// Deterministic identity of one archived batch file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveKey {
    pub table: String,
    pub window: MonthWindow,
    pub batch: i64,
}

impl ArchiveKey {
    pub fn new(table: impl Into<String>, window: MonthWindow, batch: i64) -> Self {
        Self {
            table: table.into(),
            window,
            batch,
        }
    }

    /// The object-store path for this key.
    pub fn object_path(&self) -> object_store::path::Path {
        object_store::path::Path::from(self.to_string())
    }
}

impl fmt::Display for ArchiveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "db_backup/{}/{}/backup_{}_batch{}.csv.gz",
            self.table,
            self.window.label(),
            self.window.label(),
            self.batch
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn window_bounds_are_half_open_month() {
        let w = MonthWindow::of(d(2022, 3, 17));
        assert_eq!(w.start(), d(2022, 3, 1));
        assert_eq!(w.end_exclusive(), d(2022, 4, 1));
        assert!(w.contains(d(2022, 3, 31)));
        assert!(!w.contains(d(2022, 4, 1)));
    }

    #[test]
    fn december_rolls_into_january() {
        let w = MonthWindow::of(d(2021, 12, 31));
        assert_eq!(w.end_exclusive(), d(2022, 1, 1));
        assert_eq!(w.next().label(), "2022-01");
    }

    #[test]
    fn range_tiles_exactly_without_overlap() {
        let start = d(2021, 11, 15);
        let end = d(2022, 2, 3);
        let windows = windows_for_range(start, end);
        let labels: Vec<String> = windows.iter().map(|w| w.label()).collect();
        assert_eq!(labels, vec!["2021-11", "2021-12", "2022-01", "2022-02"]);

        // Contiguous tiling: each window begins where the last one ended.
        for pair in windows.windows(2) {
            assert_eq!(pair[0].end_exclusive(), pair[1].start());
        }

        // Every date in [start, end] belongs to exactly one window.
        let mut date = start;
        while date <= end {
            let holders = windows.iter().filter(|w| w.contains(date)).count();
            assert_eq!(holders, 1, "date {} covered {} times", date, holders);
            date = date.succ_opt().unwrap();
        }
    }

    #[test]
    fn inverted_range_is_empty() {
        assert!(windows_for_range(d(2022, 5, 1), d(2022, 4, 1)).is_empty());
    }

    #[test]
    fn label_parses_and_round_trips() {
        let w = MonthWindow::from_label("2022-03").unwrap();
        assert_eq!(w.start(), d(2022, 3, 1));
        assert_eq!(w.label(), "2022-03");
        assert!(MonthWindow::from_label("2022-13").is_err());
        assert!(MonthWindow::from_label("march").is_err());
    }

    #[test]
    fn archive_key_format_is_exact() {
        let key = ArchiveKey::new("events", MonthWindow::of(d(2022, 3, 9)), 1);
        assert_eq!(
            key.to_string(),
            "db_backup/events/2022-03/backup_2022-03_batch1.csv.gz"
        );
        // No padding on the batch number.
        let key = ArchiveKey::new("events", MonthWindow::of(d(2022, 3, 9)), 12);
        assert_eq!(
            key.to_string(),
            "db_backup/events/2022-03/backup_2022-03_batch12.csv.gz"
        );
    }

    #[test]
    fn archive_key_is_deterministic() {
        let a = ArchiveKey::new("events", MonthWindow::of(d(2022, 3, 1)), 3);
        let b = ArchiveKey::new("events", MonthWindow::of(d(2022, 3, 28)), 3);
        assert_eq!(a.object_path(), b.object_path());
    }
}
