use quota_types::QuotaExceeded;
use tracing::warn;

use crate::event::LifecycleEvent;

/// Observer notified of every quota violation before it reaches the caller.
///
/// Hooks see the signal but cannot suppress it: the engine returns the same
/// error whatever the hooks do.
pub trait QuotaExceededHook: Send + Sync {
    fn on_quota_exceeded(&self, signal: &QuotaExceeded, event: &LifecycleEvent);
}

/// Logs violations at `warn` level. Installed by default.
pub struct LoggingHook;

impl QuotaExceededHook for LoggingHook {
    fn on_quota_exceeded(&self, signal: &QuotaExceeded, event: &LifecycleEvent) {
        warn!(
            node = %signal.node_id,
            attempted = signal.attempted_total,
            limit = signal.limit,
            delta = signal.delta,
            operation = %signal.operation,
            event = %event.name,
            target = %event.target,
            "quota exceeded"
        );
    }
}

/// Ignores violations, for callers that report the error themselves.
pub struct NoOpHook;

impl QuotaExceededHook for NoOpHook {
    fn on_quota_exceeded(&self, _signal: &QuotaExceeded, _event: &LifecycleEvent) {}
}
