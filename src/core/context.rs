//! Purpose: Carry a caller deadline and cancellation token through one operation.
//! Exports: `OpContext`, `DoneReason`.
//! Role: Shared by blocking HTTP calls (pre-flight check + remaining time) and async waits.
//! Invariants: Deadline expiry maps to `ErrorKind::Timeout`, caller cancellation to `ErrorKind::Cancelled`.
//! Invariants: Cancellation wins over an expired deadline when both have happened.
use super::error::{Error, ErrorKind};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DoneReason {
    Cancelled,
    DeadlineExceeded,
}

impl DoneReason {
    pub fn into_error(self, operation: &'static str) -> Error {
        match self {
            DoneReason::Cancelled => Error::new(ErrorKind::Cancelled)
                .with_message("operation cancelled by caller")
                .with_operation(operation),
            DoneReason::DeadlineExceeded => Error::new(ErrorKind::Timeout)
                .with_message("deadline exceeded")
                .with_operation(operation),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct OpContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl OpContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A timeout too large to land on the clock adds no deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Keeps the earlier of the existing and the new deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn done_reason(&self) -> Option<DoneReason> {
        if self.cancel.is_cancelled() {
            return Some(DoneReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(DoneReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Fails fast when the context is already done.
    pub fn check(&self, operation: &'static str) -> Result<(), Error> {
        match self.done_reason() {
            Some(reason) => Err(reason.into_error(operation)),
            None => Ok(()),
        }
    }

    /// Resolves once the caller cancels or the deadline passes.
    pub async fn done(&self) -> DoneReason {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => DoneReason::Cancelled,
                    _ = tokio::time::sleep_until(deadline.into()) => DoneReason::DeadlineExceeded,
                }
            }
            None => {
                self.cancel.cancelled().await;
                DoneReason::Cancelled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DoneReason, OpContext};
    use crate::core::error::ErrorKind;
    use std::time::{Duration, Instant};

    #[test]
    fn fresh_context_is_not_done() {
        let ctx = OpContext::new();
        assert_eq!(ctx.done_reason(), None);
        assert!(ctx.check("op").is_ok());
        assert_eq!(ctx.remaining(), None);
    }

    #[test]
    fn expired_deadline_is_timeout() {
        let ctx = OpContext::new().with_deadline(Instant::now() - Duration::from_millis(1));
        let err = ctx.check("get_design_document").expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.operation(), Some("get_design_document"));
    }

    #[test]
    fn cancellation_beats_expired_deadline() {
        let ctx = OpContext::new().with_deadline(Instant::now() - Duration::from_millis(1));
        ctx.cancel();
        assert_eq!(ctx.done_reason(), Some(DoneReason::Cancelled));
    }

    #[test]
    fn with_deadline_keeps_the_earlier_one() {
        let soon = Instant::now() + Duration::from_secs(1);
        let later = soon + Duration::from_secs(60);
        let ctx = OpContext::new().with_deadline(soon).with_deadline(later);
        assert_eq!(ctx.deadline(), Some(soon));
    }

    #[test]
    fn unrepresentable_timeout_adds_no_deadline() {
        let ctx = OpContext::new().with_timeout(Duration::MAX);
        assert_eq!(ctx.deadline(), None);
        assert_eq!(ctx.done_reason(), None);
        assert!(ctx.check("get_design_document").is_ok());

        let soon = Instant::now() + Duration::from_secs(1);
        let ctx = OpContext::new()
            .with_deadline(soon)
            .with_timeout(Duration::MAX);
        assert_eq!(ctx.deadline(), Some(soon));
    }

    #[tokio::test]
    async fn done_reports_deadline() {
        let ctx = OpContext::new().with_timeout(Duration::from_millis(10));
        assert_eq!(ctx.done().await, DoneReason::DeadlineExceeded);
    }

    #[tokio::test]
    async fn done_reports_cancellation() {
        let ctx = OpContext::new().with_timeout(Duration::from_secs(30));
        let handle = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            handle.cancel();
        });
        assert_eq!(ctx.done().await, DoneReason::Cancelled);
    }
}
