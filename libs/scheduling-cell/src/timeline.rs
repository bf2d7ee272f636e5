// libs/scheduling-cell/src/timeline.rs
//
// Interval arithmetic and local-day boundary helpers shared by the
// availability resolver and the conflict guard. All intervals are half-open
// `[start, end)` in UTC.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::models::SchedulingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Half-open overlap test: `a.start < b.end && b.start < a.end`.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Merge overlapping or adjacent intervals into a sorted, non-overlapping
/// list. Standard sweep: sort by start, extend the current interval while the
/// next one starts at or before its end.
pub fn merge_intervals(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.retain(|iv| !iv.is_empty());
    if intervals.is_empty() {
        return intervals;
    }

    intervals.sort_by_key(|iv| iv.start);

    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    let mut current = intervals[0];

    for next in intervals.into_iter().skip(1) {
        if next.start <= current.end {
            if next.end > current.end {
                current.end = next.end;
            }
        } else {
            merged.push(current);
            current = next;
        }
    }
    merged.push(current);

    merged
}

/// Complement of `busy` (already merged and sorted) within `window`.
pub fn free_gaps(window: Interval, busy: &[Interval]) -> Vec<Interval> {
    let mut gaps = Vec::new();
    let mut cursor = window.start;

    for iv in busy {
        if iv.end <= window.start || iv.start >= window.end {
            continue;
        }
        let clipped_start = iv.start.max(window.start);
        if clipped_start > cursor {
            gaps.push(Interval::new(cursor, clipped_start));
        }
        cursor = cursor.max(iv.end.min(window.end));
    }

    if cursor < window.end {
        gaps.push(Interval::new(cursor, window.end));
    }

    gaps
}

/// Resolve a local wall-clock datetime in `tz` to a UTC instant. Ambiguous
/// times (DST fall-back) take the earlier instant; times skipped by a DST
/// jump are pushed forward until they resolve.
pub fn resolve_local(tz: Tz, local: NaiveDateTime) -> Result<DateTime<Utc>, SchedulingError> {
    let mut candidate = local;
    for _ in 0..4 {
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(dt) => return Ok(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => return Ok(earliest.with_timezone(&Utc)),
            LocalResult::None => {
                candidate += Duration::hours(1);
            }
        }
    }
    Err(SchedulingError::InvalidInput(format!(
        "Local time {} cannot be resolved in zone {}",
        local, tz
    )))
}

/// The `[start of day, start of next day)` window for `date` in the
/// provider's zone, as UTC instants. Day boundaries are local, not UTC, so
/// offset zones do not leak slots into neighboring dates.
pub fn local_day_bounds(
    date: NaiveDate,
    tz: Tz,
) -> Result<(DateTime<Utc>, DateTime<Utc>), SchedulingError> {
    let day_start = resolve_local(tz, date.and_time(NaiveTime::MIN))?;
    let next_day = date
        .succ_opt()
        .ok_or_else(|| SchedulingError::InvalidInput("Date out of range".to_string()))?;
    let day_end = resolve_local(tz, next_day.and_time(NaiveTime::MIN))?;
    Ok((day_start, day_end))
}

/// A local clock time on `date` in `tz`, as a UTC instant.
pub fn local_instant(
    date: NaiveDate,
    time: NaiveTime,
    tz: Tz,
) -> Result<DateTime<Utc>, SchedulingError> {
    resolve_local(tz, date.and_time(time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    #[test]
    fn merge_combines_overlapping_and_adjacent() {
        let merged = merge_intervals(vec![
            Interval::new(utc(13, 0), utc(14, 0)),
            Interval::new(utc(9, 0), utc(10, 0)),
            Interval::new(utc(9, 30), utc(11, 0)),
            Interval::new(utc(11, 0), utc(12, 0)),
        ]);
        assert_eq!(
            merged,
            vec![
                Interval::new(utc(9, 0), utc(12, 0)),
                Interval::new(utc(13, 0), utc(14, 0)),
            ]
        );
    }

    #[test]
    fn merge_drops_empty_intervals() {
        let merged = merge_intervals(vec![
            Interval::new(utc(10, 0), utc(10, 0)),
            Interval::new(utc(9, 0), utc(9, 30)),
        ]);
        assert_eq!(merged, vec![Interval::new(utc(9, 0), utc(9, 30))]);
    }

    #[test]
    fn gaps_complement_busy_within_window() {
        let window = Interval::new(utc(9, 0), utc(17, 0));
        let busy = vec![
            Interval::new(utc(8, 0), utc(9, 30)),
            Interval::new(utc(12, 0), utc(13, 0)),
            Interval::new(utc(16, 30), utc(18, 0)),
        ];
        assert_eq!(
            free_gaps(window, &busy),
            vec![
                Interval::new(utc(9, 30), utc(12, 0)),
                Interval::new(utc(13, 0), utc(16, 30)),
            ]
        );
    }

    #[test]
    fn gaps_with_no_busy_is_whole_window() {
        let window = Interval::new(utc(9, 0), utc(17, 0));
        assert_eq!(free_gaps(window, &[]), vec![window]);
    }

    #[test]
    fn day_bounds_follow_the_local_zone() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let (start, end) = local_day_bounds(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(), tz).unwrap();
        // EST is UTC-5 in early March
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 3, 2, 5, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 3, 3, 5, 0, 0).unwrap());
    }

    #[test]
    fn dst_spring_forward_day_is_23_hours() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let (start, end) = local_day_bounds(NaiveDate::from_ymd_opt(2026, 3, 8).unwrap(), tz).unwrap();
        assert_eq!(end - start, Duration::hours(23));
    }
}
