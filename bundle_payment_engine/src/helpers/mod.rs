use chrono::{DateTime, Duration, Utc};

use crate::db_types::FulfillmentTracking;

/// The backoff schedule for fulfillment retries, keyed by the attempt that just failed.
///
/// Returns `None` once the schedule is exhausted; the caller combines this with the tracking record's
/// `max_attempts` to decide when a failure is terminal.
pub fn retry_backoff(failed_attempt: i64) -> Option<Duration> {
    match failed_attempt {
        1 => Some(Duration::minutes(5)),
        2 => Some(Duration::minutes(15)),
        3 => Some(Duration::minutes(60)),
        _ => None,
    }
}

/// When the *next* attempt for this tracking record should run, given that the attempt about to be recorded
/// failed. `None` means the failure is terminal: either the schedule is exhausted or the attempt cap is reached.
pub fn next_retry_after(tracking: &FulfillmentTracking, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let failing_attempt = tracking.attempts + 1;
    if failing_attempt >= tracking.max_attempts {
        return None;
    }
    retry_backoff(failing_attempt).map(|delay| now + delay)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn backoff_schedule() {
        assert_eq!(retry_backoff(1), Some(Duration::minutes(5)));
        assert_eq!(retry_backoff(2), Some(Duration::minutes(15)));
        assert_eq!(retry_backoff(3), Some(Duration::minutes(60)));
        assert_eq!(retry_backoff(4), None);
        assert_eq!(retry_backoff(0), None);
    }

    #[test]
    fn retry_exhaustion_is_terminal() {
        let now = Utc::now();
        let mut tracking = FulfillmentTracking {
            id: 1,
            order_id: "BP-1".parse().unwrap(),
            provider_ref: None,
            attempts: 0,
            max_attempts: 3,
            status: crate::db_types::TrackingStatus::Pending,
            last_error: None,
            next_retry_at: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(next_retry_after(&tracking, now), Some(now + Duration::minutes(5)));
        tracking.attempts = 1;
        assert_eq!(next_retry_after(&tracking, now), Some(now + Duration::minutes(15)));
        tracking.attempts = 2;
        assert_eq!(next_retry_after(&tracking, now), None);
    }
}
