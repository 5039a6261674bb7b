use beacon_store::Schedule;
use chrono::{DateTime, Duration, Utc};

/// When a freshly created (or rescheduled) trigger first fires.
///
/// An absolute `schedule_time` already in the past is returned as is; the
/// queue runs it on the next poll.
pub fn initial_due(schedule: &Schedule, now: DateTime<Utc>) -> DateTime<Utc> {
    match schedule {
        Schedule::At { schedule_time } => *schedule_time,
        Schedule::Every { minutes } => now + Duration::minutes(i64::from(*minutes)),
    }
}

/// When a recurring trigger fires next, given the instant the current
/// firing was due and the instant it actually ran.
///
/// Absolute-time triggers advance one day from `due_at`, so N firings land
/// exactly N days after the original `schedule_time` however late the
/// worker ran. Interval triggers count from the actual fire time.
pub fn next_due(schedule: &Schedule, due_at: DateTime<Utc>, fired_at: DateTime<Utc>) -> DateTime<Utc> {
    match schedule {
        Schedule::At { .. } => due_at + Duration::days(1),
        Schedule::Every { minutes } => fired_at + Duration::minutes(i64::from(*minutes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 10, 6, 30, 0).unwrap()
    }

    #[test]
    fn interval_counts_from_now() {
        let s = Schedule::Every { minutes: 5 };
        assert_eq!(initial_due(&s, t0()), t0() + Duration::minutes(5));
    }

    #[test]
    fn absolute_time_is_used_verbatim() {
        let at = t0() - Duration::hours(1);
        assert_eq!(initial_due(&Schedule::At { schedule_time: at }, t0()), at);
    }

    #[test]
    fn daily_recurrence_ignores_worker_lag() {
        let s = Schedule::At { schedule_time: t0() };
        let late = t0() + Duration::minutes(17);
        assert_eq!(next_due(&s, t0(), late), t0() + Duration::days(1));
    }

    #[test]
    fn interval_recurrence_counts_from_fire_time() {
        let s = Schedule::Every { minutes: 5 };
        let late = t0() + Duration::seconds(40);
        assert_eq!(next_due(&s, t0(), late), late + Duration::minutes(5));
    }
}
