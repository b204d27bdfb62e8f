//! Failure capture and the debug error channel.
//!
//! Panics inside a unit of actor work are turned into an [`ErrorReport`]
//! (message + stack trace). When the runtime runs with `debug = true` the
//! report is also handed to a [`GatewayErrorChannel`] so developers see server
//! errors on their client.

use crate::types::{current_timestamp, EntityId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::sync::Once;
use tokio::sync::mpsc;

/// Where a failed unit of work came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOrigin {
    /// The periodic tick.
    Tick,
    /// A queued asynchronous call or delivery.
    Call,
    /// The close hook run after the loop ends.
    Shutdown,
}

impl std::fmt::Display for WorkOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkOrigin::Tick => write!(f, "tick"),
            WorkOrigin::Call => write!(f, "call"),
            WorkOrigin::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// A recovered unit-of-work failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub entity_id: EntityId,
    pub origin: WorkOrigin,
    pub error: String,
    pub stack: String,
    pub timestamp: u64,
}

impl ErrorReport {
    pub fn new(entity_id: EntityId, origin: WorkOrigin, error: String, stack: String) -> Self {
        Self {
            entity_id,
            origin,
            error,
            stack,
            timestamp: current_timestamp(),
        }
    }
}

/// Well-known gateway endpoint that receives server errors in debug builds.
#[async_trait]
pub trait GatewayErrorChannel: Send + Sync {
    async fn server_error(&self, report: ErrorReport);
}

/// Error channel backed by a tokio channel; the receiving side decides what to
/// do with the reports (forward to a client, log, assert in tests).
#[derive(Debug, Clone)]
pub struct ChannelErrorSink {
    sender: mpsc::UnboundedSender<ErrorReport>,
}

impl ChannelErrorSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ErrorReport>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl GatewayErrorChannel for ChannelErrorSink {
    async fn server_error(&self, report: ErrorReport) {
        if self.sender.send(report).is_err() {
            tracing::debug!("Gateway error channel closed, dropping report");
        }
    }
}

thread_local! {
    static LAST_PANIC_STACK: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Chains a panic hook that records the panicking thread's backtrace so the
/// supervisor can attach it to the report. Installed once per process.
pub(crate) fn install_panic_capture() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let stack = Backtrace::force_capture().to_string();
            LAST_PANIC_STACK.with(|slot| *slot.borrow_mut() = Some(stack));
            previous(info);
        }));
    });
}

/// Takes the stack recorded by the last panic on this thread.
pub(crate) fn take_panic_stack() -> String {
    LAST_PANIC_STACK
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| Backtrace::force_capture().to_string())
}

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panicked with unknown error".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn test_panic_message_extraction() {
        let payload = catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload = catch_unwind(|| panic!("{} {}", "formatted", 42)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted 42");

        let payload = catch_unwind(|| std::panic::panic_any(7u32)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "panicked with unknown error");
    }

    #[test]
    fn test_stack_is_captured() {
        install_panic_capture();
        let _ = catch_unwind(AssertUnwindSafe(|| panic!("captured")));
        let stack = take_panic_stack();
        assert!(!stack.is_empty());
    }

    #[tokio::test]
    async fn test_channel_sink_forwards_reports() {
        let (sink, mut reports) = ChannelErrorSink::new();
        let report = ErrorReport::new(EntityId(9), WorkOrigin::Tick, "bad".into(), "stack".into());
        sink.server_error(report.clone()).await;

        let received = reports.recv().await.unwrap();
        assert_eq!(received.entity_id, EntityId(9));
        assert_eq!(received.origin, WorkOrigin::Tick);
        assert_eq!(received.error, "bad");
    }
}
