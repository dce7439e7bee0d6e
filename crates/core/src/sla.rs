use chrono::{DateTime, Duration, Utc};

use crate::config::WorkflowRules;
use crate::domain::request::WorkRequest;

/// Read-time deadline arithmetic. Nothing here is ever stored, so the
/// answers are always consistent with the wall clock at query time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlaTracker {
    approaching_window: Duration,
}

impl SlaTracker {
    pub fn new(approaching_window_hours: i64) -> Self {
        Self { approaching_window: Duration::hours(approaching_window_hours) }
    }

    pub fn from_rules(rules: &WorkflowRules) -> Self {
        Self::new(rules.sla.approaching_window)
    }

    pub fn time_remaining(&self, request: &WorkRequest, now: DateTime<Utc>) -> Duration {
        Duration::hours(request.sla_target_hours) - (now - request.created_at)
    }

    /// Whole hours until the SLA target; negative once the target has passed.
    pub fn hours_until_target(&self, request: &WorkRequest, now: DateTime<Utc>) -> i64 {
        self.time_remaining(request, now).num_hours()
    }

    pub fn is_overdue(&self, request: &WorkRequest, now: DateTime<Utc>) -> bool {
        request.status.is_active() && self.time_remaining(request, now) < Duration::zero()
    }

    pub fn is_approaching_breach(&self, request: &WorkRequest, now: DateTime<Utc>) -> bool {
        if !request.status.is_active() {
            return false;
        }
        let remaining = self.time_remaining(request, now);
        remaining >= Duration::zero() && remaining <= self.approaching_window
    }
}
