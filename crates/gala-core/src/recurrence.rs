//! # Recurrence Rules
//!
//! Rule model and occurrence expansion for repeating event series.
//!
//! A series root carries one `RecurrenceRule`, serialized as JSON on its
//! row; generated instances carry none. Expansion is a pure function from
//! (rule, series start date) to a bounded list of concrete dates, which
//! the lifecycle manager materializes into instance events.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Hard cap on occurrences produced by one expansion.
pub const MAX_OCCURRENCES: usize = 366;

/// Hard cap on the scan horizon for open-ended rules, in days.
pub const MAX_HORIZON_DAYS: u64 = 731;

// =============================================================================
// Rule Model
// =============================================================================

/// How often the series repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    /// Every Monday through Friday.
    Weekdays,
    /// An explicit set of weekdays.
    Custom,
}

/// Day-of-week selector. Stored in rules instead of `chrono::Weekday`
/// so the JSON wire shape stays under our control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl From<DayOfWeek> for Weekday {
    fn from(d: DayOfWeek) -> Weekday {
        match d {
            DayOfWeek::Mon => Weekday::Mon,
            DayOfWeek::Tue => Weekday::Tue,
            DayOfWeek::Wed => Weekday::Wed,
            DayOfWeek::Thu => Weekday::Thu,
            DayOfWeek::Fri => Weekday::Fri,
            DayOfWeek::Sat => Weekday::Sat,
            DayOfWeek::Sun => Weekday::Sun,
        }
    }
}

/// When the series stops producing occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecurrenceEnd {
    /// Open-ended; expansion is bounded by [`MAX_HORIZON_DAYS`].
    Never,
    /// Last occurrence on or before this date.
    OnDate { date: NaiveDate },
    /// A fixed number of occurrences, counting the series start.
    AfterCount { count: u32 },
}

/// A repeating-series rule, carried only by the series root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    /// Every Nth period. 0 is treated as 1.
    #[serde(default = "default_interval")]
    pub interval: u32,
    /// Weekday selectors for Weekly/Custom frequencies and for
    /// week-of-month targeting.
    #[serde(default)]
    pub by_weekday: Vec<DayOfWeek>,
    /// Day-of-month selector for Monthly; clamped into short months.
    #[serde(default)]
    pub day_of_month: Option<u32>,
    /// Nth-weekday-of-month selector for Monthly (1-5).
    #[serde(default)]
    pub week_of_month: Option<u32>,
    pub end: RecurrenceEnd,
}

fn default_interval() -> u32 {
    1
}

impl RecurrenceRule {
    fn interval(&self) -> u32 {
        self.interval.max(1)
    }

    /// Shrinks the end condition so regeneration produces nothing on or
    /// after `boundary`. Used after "this and future" deletion.
    pub fn shrink_end_before(&mut self, boundary: NaiveDate) {
        let last = boundary.pred_opt().unwrap_or(boundary);
        self.end = RecurrenceEnd::OnDate { date: last };
    }

    /// Whether `date` matches this rule's pattern relative to `start`.
    fn matches(&self, start: NaiveDate, date: NaiveDate) -> bool {
        let days_since = (date - start).num_days();
        match self.frequency {
            Frequency::Daily => days_since % self.interval() as i64 == 0,
            Frequency::Weekly => {
                let selected = self.selected_weekdays(start);
                let weeks_since = days_since.div_euclid(7);
                selected.contains(&date.weekday()) && weeks_since % self.interval() as i64 == 0
            }
            Frequency::Monthly => {
                if months_between(start, date) % self.interval() as i64 != 0 {
                    return false;
                }
                if let Some(nth) = self.week_of_month {
                    let weekday = self
                        .by_weekday
                        .first()
                        .map(|d| Weekday::from(*d))
                        .unwrap_or_else(|| start.weekday());
                    date.weekday() == weekday && nth_weekday_of_month(date) == nth
                } else {
                    let target = self.day_of_month.unwrap_or(start.day());
                    date.day() == target.min(days_in_month(date))
                }
            }
            Frequency::Yearly => {
                let years_since = date.year() - start.year();
                if years_since % self.interval() as i32 != 0 {
                    return false;
                }
                // Feb 29 starts fall back to Feb 28 in common years.
                date.month() == start.month()
                    && date.day() == start.day().min(days_in_month(date))
            }
            Frequency::Weekdays => matches!(
                date.weekday(),
                Weekday::Mon | Weekday::Tue | Weekday::Wed | Weekday::Thu | Weekday::Fri
            ),
            Frequency::Custom => self.selected_weekdays(start).contains(&date.weekday()),
        }
    }

    fn selected_weekdays(&self, start: NaiveDate) -> Vec<Weekday> {
        if self.by_weekday.is_empty() {
            vec![start.weekday()]
        } else {
            self.by_weekday.iter().map(|d| Weekday::from(*d)).collect()
        }
    }
}

// =============================================================================
// Expansion
// =============================================================================

/// Enumerates the concrete occurrence dates of a rule, starting at (and
/// including) `series_start` when it matches the pattern.
///
/// The result is bounded by the rule's end condition and by the
/// [`MAX_OCCURRENCES`]/[`MAX_HORIZON_DAYS`] safety caps, so open-ended
/// rules cannot run away during regeneration.
pub fn occurrences(rule: &RecurrenceRule, series_start: NaiveDate) -> Vec<NaiveDate> {
    let horizon = match rule.end {
        RecurrenceEnd::OnDate { date } => date.min(
            series_start
                .checked_add_days(Days::new(MAX_HORIZON_DAYS))
                .unwrap_or(date),
        ),
        _ => series_start
            .checked_add_days(Days::new(MAX_HORIZON_DAYS))
            .unwrap_or(series_start),
    };

    let target_count = match rule.end {
        RecurrenceEnd::AfterCount { count } => (count as usize).min(MAX_OCCURRENCES),
        _ => MAX_OCCURRENCES,
    };

    let mut out = Vec::new();
    let mut date = series_start;
    while date <= horizon && out.len() < target_count {
        if rule.matches(series_start, date) {
            out.push(date);
        }
        date = match date.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    out
}

fn months_between(start: NaiveDate, date: NaiveDate) -> i64 {
    (date.year() as i64 - start.year() as i64) * 12 + (date.month() as i64 - start.month() as i64)
}

fn days_in_month(date: NaiveDate) -> u32 {
    let (next_y, next_m) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(next_y, next_m, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

fn nth_weekday_of_month(date: NaiveDate) -> u32 {
    (date.day() - 1) / 7 + 1
}

// =============================================================================
// Unit Tests
// =============================================================================
