use chrono::{DateTime, Datelike, Duration, Months, TimeZone, Utc};

use crate::models::{Period, TimeGranularity};

/// Resolves the time buckets for a granularity. Pure over the supplied `now`
/// so repeated invocations with the same clock value yield the same buckets.
pub fn buckets(
    granularity: TimeGranularity,
    now: DateTime<Utc>,
    history_months: u32,
) -> Vec<Period> {
    match granularity {
        TimeGranularity::Weekly => {
            let mut periods = Vec::new();
            let mut start = sub_months(now, history_months);
            loop {
                let end = start + Duration::days(7);
                if end > now {
                    break;
                }
                periods.push(Period {
                    label: format!("week-{}", start.format("%Y-%m-%d")),
                    start,
                    end,
                });
                start = end;
            }
            periods
        }
        TimeGranularity::Monthly => {
            let mut periods = Vec::new();
            let mut start = month_start(sub_months(now, history_months));
            while start <= now {
                let next = start
                    .checked_add_months(Months::new(1))
                    .unwrap_or(now);
                periods.push(Period {
                    label: start.format("%Y-%m").to_string(),
                    start,
                    end: next.min(now),
                });
                if next > now {
                    break;
                }
                start = next;
            }
            periods
        }
        TimeGranularity::Term => {
            let start = sub_months(now, 4);
            vec![Period {
                label: format!("term-{}", start.format("%Y-%m-%d")),
                start,
                end: now,
            }]
        }
        TimeGranularity::AllTime => vec![Period {
            label: "all-time".to_string(),
            start: sub_months(now, 12),
            end: now,
        }],
    }
}

/// The bucket a leaderboard computed "now" covers: the most recent one.
pub fn active_window(
    granularity: TimeGranularity,
    now: DateTime<Utc>,
    history_months: u32,
) -> Period {
    buckets(granularity, now, history_months)
        .pop()
        .unwrap_or(Period {
            label: format!("week-{}", (now - Duration::days(7)).format("%Y-%m-%d")),
            start: now - Duration::days(7),
            end: now,
        })
}

fn sub_months(now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(months)).unwrap_or(now)
}

fn month_start(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(at.year(), at.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 18, 12, 30, 0).single().unwrap()
    }

    #[test]
    fn weekly_buckets_are_reproducible() {
        let now = fixed_now();
        let first = buckets(TimeGranularity::Weekly, now, 3);
        let second = buckets(TimeGranularity::Weekly, now, 3);
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn weekly_buckets_never_end_past_now() {
        let now = fixed_now();
        for period in buckets(TimeGranularity::Weekly, now, 3) {
            assert!(period.end <= now);
            assert_eq!(period.end - period.start, Duration::days(7));
        }
    }

    #[test]
    fn monthly_buckets_start_on_calendar_months() {
        let now = fixed_now();
        let periods = buckets(TimeGranularity::Monthly, now, 3);
        assert_eq!(periods.len(), 4);
        assert_eq!(periods[0].label, "2025-12");
        for period in &periods {
            assert_eq!(period.start.day(), 1);
        }
        assert_eq!(periods.last().unwrap().end, now);
    }

    #[test]
    fn term_is_a_single_four_month_bucket() {
        let now = fixed_now();
        let periods = buckets(TimeGranularity::Term, now, 3);
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].start.month(), 11);
        assert_eq!(periods[0].end, now);
    }

    #[test]
    fn all_time_spans_one_year() {
        let now = fixed_now();
        let periods = buckets(TimeGranularity::AllTime, now, 3);
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].start.year(), 2025);
        assert_eq!(periods[0].start.month(), 3);
    }

    #[test]
    fn active_window_is_the_latest_bucket() {
        let now = fixed_now();
        let all = buckets(TimeGranularity::Weekly, now, 3);
        let active = active_window(TimeGranularity::Weekly, now, 3);
        assert_eq!(Some(&active), all.last());
    }
}
