//! Consumer cleanup on cancel and disconnect.

use crate::session::Session;
use crate::types::LifecycleState;

/// Why a session's consumers are being released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelTrigger {
    /// The client asked to cancel
    Request,
    /// The connection closed or failed
    Disconnect,
}

impl std::fmt::Display for CancelTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelTrigger::Request => write!(f, "request"),
            CancelTrigger::Disconnect => write!(f, "disconnect"),
        }
    }
}

/// Outcome of a cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Consumers cancelled successfully
    pub cancelled: usize,
    /// Consumers whose cancel failed
    pub failed: usize,
}

impl CleanupReport {
    /// True when there was nothing to release.
    pub fn is_empty(&self) -> bool {
        self.cancelled == 0 && self.failed == 0
    }
}

impl Session {
    /// Cancel every consumer this session holds and forget its bindings.
    ///
    /// A failed cancel is logged and counted and the remaining handles are
    /// still cancelled. Afterwards the session is idle and holds nothing, so
    /// a second call is a no-op.
    pub async fn cancel_all(&mut self, trigger: CancelTrigger) -> CleanupReport {
        if self.consumers.is_empty() {
            tracing::debug!(session = %self.id, %trigger, "Nothing to cancel");
            return CleanupReport::default();
        }

        self.state = LifecycleState::Canceling;
        let mut report = CleanupReport::default();
        for handle in std::mem::take(&mut self.consumers) {
            match self.gateway.cancel(&handle).await {
                Ok(()) => report.cancelled += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        session = %self.id,
                        consumer = %handle,
                        error = %e,
                        "Cancel failed, continuing cleanup"
                    );
                }
            }
        }

        for forwarder in self.forwarders.drain(..) {
            forwarder.abort();
        }
        self.bindings.clear();
        self.admin_binding = None;
        self.state = LifecycleState::Idle;

        tracing::info!(
            session = %self.id,
            %trigger,
            cancelled = report.cancelled,
            failed = report.failed,
            "Session consumers released"
        );
        report
    }
}
