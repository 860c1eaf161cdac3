//! Timing rules: next fire instant, startup recovery plan, wall-clock waits.
//!
//! Everything here except [`sleep_until`] is pure and takes `now` explicitly.

use std::time::Duration;

use chrono::{NaiveDateTime, NaiveTime};

use synk_core::Task;

use crate::paths::MAX_NAP;

/// Next daily occurrence of `time_of_day` strictly after `now`.
pub fn next_fire(time_of_day: NaiveTime, now: NaiveDateTime) -> NaiveDateTime {
    let today = now.date().and_time(time_of_day);
    if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    }
}

/// Real time left until `until`; zero once it has passed.
pub fn wait_duration(until: NaiveDateTime, now: NaiveDateTime) -> Duration {
    (until - now).to_std().unwrap_or(Duration::ZERO)
}

/// Sleep until the local wall clock reaches `until`.
///
/// Naps of at most [`MAX_NAP`] so clock adjustments and suspend/resume are
/// noticed instead of trusting one long monotonic sleep.
pub async fn sleep_until(until: NaiveDateTime) {
    loop {
        let remaining = wait_duration(until, synk_core::types::local_now());
        if remaining.is_zero() {
            return;
        }
        tokio::time::sleep(remaining.min(MAX_NAP)).await;
    }
}

/// What startup recovery does with one stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Repeat task moved to its next occurrence; persist, then dispatch.
    Reschedule {
        task: Task,
        next_fire: NaiveDateTime,
    },
    /// One-time task whose instant has passed; delete without running.
    Missed(Task),
    /// Dispatch unchanged. Records with unparsable schedules land here too
    /// and fail inside their own execution unit.
    Dispatch(Task),
}

/// Decide what to do with every stored record at startup. Templates are
/// omitted.
pub fn plan_recovery(tasks: Vec<Task>, now: NaiveDateTime) -> Vec<RecoveryAction> {
    tasks
        .into_iter()
        .filter(|task| !task.is_template)
        .map(|task| match task.scheduled() {
            Ok(at) if task.is_repeat => RecoveryAction::Reschedule {
                next_fire: next_fire(at.time(), now),
                task,
            },
            Ok(at) if at <= now => RecoveryAction::Missed(task),
            _ => RecoveryAction::Dispatch(task),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;
    use synk_core::StoredDateTime;

    fn dt(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 12, day)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn tod(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[rstest]
    #[case::later_today(tod(18, 0), dt(10, 9, 0, 0), dt(10, 18, 0, 0))]
    #[case::earlier_today(tod(6, 0), dt(10, 9, 0, 0), dt(11, 6, 0, 0))]
    #[case::exactly_now_rolls_over(tod(9, 0), dt(10, 9, 0, 0), dt(11, 9, 0, 0))]
    #[case::year_end(
        tod(0, 30),
        dt(31, 23, 59, 59),
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap().and_hms_opt(0, 30, 0).unwrap()
    )]
    fn next_fire_cases(
        #[case] time_of_day: NaiveTime,
        #[case] now: NaiveDateTime,
        #[case] expected: NaiveDateTime,
    ) {
        assert_eq!(next_fire(time_of_day, now), expected);
    }

    #[test]
    fn next_fire_is_always_strictly_after_now() {
        let now = dt(15, 12, 0, 0);
        for hour in 0..24 {
            let fire = next_fire(tod(hour, 0), now);
            assert!(fire > now);
            assert!(fire - now <= chrono::Duration::days(1));
        }
    }

    #[test]
    fn wait_duration_saturates_at_zero() {
        assert_eq!(wait_duration(dt(1, 0, 0, 0), dt(2, 0, 0, 0)), Duration::ZERO);
        assert_eq!(
            wait_duration(dt(1, 0, 0, 30), dt(1, 0, 0, 0)),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn recovery_plan_covers_every_shape() {
        let now = dt(20, 12, 0, 0);
        let template = Task::template("/t".into(), "/d".into(), dt(1, 8, 0, 0));
        let repeat = Task::repeating("/r".into(), "/d".into(), dt(1, 7, 15, 0));
        let missed = Task::one_time("/m".into(), "/d".into(), dt(20, 11, 59, 0));
        let future = Task::one_time("/f".into(), "/d".into(), dt(21, 9, 0, 0));
        let mut broken = Task::one_time("/b".into(), "/d".into(), dt(21, 9, 0, 0));
        broken.scheduled_datetime = StoredDateTime("tomorrow-ish".into());

        let plan = plan_recovery(
            vec![template, repeat.clone(), missed.clone(), future.clone(), broken.clone()],
            now,
        );

        assert_eq!(
            plan,
            vec![
                RecoveryAction::Reschedule {
                    task: repeat,
                    next_fire: dt(21, 7, 15, 0),
                },
                RecoveryAction::Missed(missed),
                RecoveryAction::Dispatch(future),
                RecoveryAction::Dispatch(broken),
            ]
        );
    }

    #[test]
    fn one_time_task_due_exactly_now_is_missed() {
        let now = dt(5, 10, 0, 0);
        let task = Task::one_time("/s".into(), "/d".into(), now);
        assert_eq!(
            plan_recovery(vec![task.clone()], now),
            vec![RecoveryAction::Missed(task)]
        );
    }
}
