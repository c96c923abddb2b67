use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Free-tier requests allowed per rolling 24h window
pub const DAILY_FREE_LIMIT: u32 = 5;

fn reset_window() -> Duration {
    Duration::hours(24)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Paid,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Paid => "paid",
        }
    }
}

/// Requests left in the current window. Paid plans are not metered, and the
/// wire contract reports them as the string `"unlimited"` rather than a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    Unlimited,
    Count(u32),
}

impl Serialize for Remaining {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Remaining::Unlimited => serializer.serialize_str("unlimited"),
            Remaining::Count(n) => serializer.serialize_u32(*n),
        }
    }
}

/// Outcome of a usage check, returned whether or not the request was admitted.
#[derive(Debug, Clone)]
pub struct UsageDecision {
    pub allowed: bool,
    pub plan: Plan,
    pub remaining: Remaining,
    pub reset_time: DateTime<Utc>,
    pub total_used: u32,
}

#[derive(Debug, Clone)]
struct UsageRecord {
    count: u32,
    window_start: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Store {
    usage: HashMap<String, UsageRecord>,
    plans: HashMap<String, Plan>,
}

/// In-memory usage and plan store, keyed by an opaque caller identifier.
///
/// State is process-local and volatile: nothing survives a restart, and a
/// multi-instance deployment would need a shared store behind the same
/// interface. The check-then-increment sequence runs under a single lock so
/// concurrent requests from one identifier cannot overshoot the limit.
#[derive(Clone, Default)]
pub struct UsageTracker {
    store: Arc<Mutex<Store>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether `identifier` may make another caption request, counting
    /// the request against its quota when admitted on the free plan.
    pub fn check(&self, identifier: &str) -> UsageDecision {
        self.check_at(identifier, Utc::now())
    }

    /// Same as [`check`](Self::check) with an explicit clock, so window
    /// expiry can be exercised without waiting 24 hours.
    pub fn check_at(&self, identifier: &str, now: DateTime<Utc>) -> UsageDecision {
        let mut store = self.lock();

        let plan = store.plans.get(identifier).copied().unwrap_or(Plan::Free);
        let record = store
            .usage
            .entry(identifier.to_string())
            .or_insert(UsageRecord {
                count: 0,
                window_start: now,
            });

        // Expired windows reset in place, before the admission decision.
        if now - record.window_start > reset_window() {
            record.count = 0;
            record.window_start = now;
            tracing::info!(identifier, "usage window reset");
        }

        let allowed = plan == Plan::Paid || record.count < DAILY_FREE_LIMIT;
        if allowed && plan == Plan::Free {
            record.count += 1;
        }

        let remaining = match plan {
            Plan::Paid => Remaining::Unlimited,
            Plan::Free => Remaining::Count(DAILY_FREE_LIMIT.saturating_sub(record.count)),
        };

        UsageDecision {
            allowed,
            plan,
            remaining,
            reset_time: record.window_start + reset_window(),
            total_used: record.count,
        }
    }

    /// Current plan for `identifier`, defaulting to free. No side effects.
    pub fn plan(&self, identifier: &str) -> Plan {
        self.lock()
            .plans
            .get(identifier)
            .copied()
            .unwrap_or(Plan::Free)
    }

    /// Upgrade `identifier` to the paid plan. Idempotent; prior usage counts
    /// are untouched.
    pub fn upgrade(&self, identifier: &str) -> Plan {
        self.lock().plans.insert(identifier.to_string(), Plan::Paid);
        tracing::info!(identifier, "upgraded to paid plan");
        Plan::Paid
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        // A poisoned lock means another request panicked mid-update; the map
        // itself is still usable.
        match self.store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_admitted_with_four_remaining() {
        let tracker = UsageTracker::new();
        let decision = tracker.check("u1");

        assert!(decision.allowed);
        assert_eq!(decision.plan, Plan::Free);
        assert_eq!(decision.remaining, Remaining::Count(4));
        assert_eq!(decision.total_used, 1);
    }

    #[test]
    fn sixth_request_within_window_denied() {
        let tracker = UsageTracker::new();
        let now = Utc::now();

        for _ in 0..DAILY_FREE_LIMIT {
            assert!(tracker.check_at("u1", now).allowed);
        }

        let denied = tracker.check_at("u1", now);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, Remaining::Count(0));
        assert_eq!(denied.total_used, DAILY_FREE_LIMIT);
        assert_eq!(denied.reset_time, now + Duration::hours(24));
    }

    #[test]
    fn elapsed_window_resets_count() {
        let tracker = UsageTracker::new();
        let start = Utc::now();

        for _ in 0..=DAILY_FREE_LIMIT {
            tracker.check_at("u1", start);
        }
        assert!(!tracker.check_at("u1", start).allowed);

        let later = start + Duration::hours(25);
        let decision = tracker.check_at("u1", later);
        assert!(decision.allowed);
        assert_eq!(decision.total_used, 1);
        assert_eq!(decision.reset_time, later + Duration::hours(24));

        // Four more fit in the fresh window, the one after that is denied.
        for _ in 0..DAILY_FREE_LIMIT - 1 {
            assert!(tracker.check_at("u1", later).allowed);
        }
        assert!(!tracker.check_at("u1", later).allowed);
    }

    #[test]
    fn paid_plan_is_never_limited() {
        let tracker = UsageTracker::new();
        tracker.upgrade("vip");

        for _ in 0..50 {
            let decision = tracker.check("vip");
            assert!(decision.allowed);
            assert_eq!(decision.plan, Plan::Paid);
            assert_eq!(decision.remaining, Remaining::Unlimited);
        }
    }

    #[test]
    fn upgrade_keeps_prior_usage_count() {
        let tracker = UsageTracker::new();
        let now = Utc::now();

        tracker.check_at("u1", now);
        tracker.check_at("u1", now);

        assert_eq!(tracker.plan("u1"), Plan::Free);
        assert_eq!(tracker.upgrade("u1"), Plan::Paid);
        assert_eq!(tracker.plan("u1"), Plan::Paid);

        let decision = tracker.check_at("u1", now);
        assert!(decision.allowed);
        assert_eq!(decision.plan, Plan::Paid);
        // The free-tier counter stays where it was.
        assert_eq!(decision.total_used, 2);
    }

    #[test]
    fn upgrade_is_idempotent() {
        let tracker = UsageTracker::new();
        tracker.upgrade("u1");
        tracker.upgrade("u1");
        assert_eq!(tracker.plan("u1"), Plan::Paid);
    }

    #[test]
    fn remaining_serializes_to_string_or_number() {
        assert_eq!(
            serde_json::to_value(Remaining::Unlimited).unwrap(),
            serde_json::json!("unlimited")
        );
        assert_eq!(
            serde_json::to_value(Remaining::Count(3)).unwrap(),
            serde_json::json!(3)
        );
    }

    #[test]
    fn identifiers_are_tracked_independently() {
        let tracker = UsageTracker::new();
        let now = Utc::now();

        for _ in 0..=DAILY_FREE_LIMIT {
            tracker.check_at("u1", now);
        }
        assert!(!tracker.check_at("u1", now).allowed);
        assert!(tracker.check_at("u2", now).allowed);
    }
}
