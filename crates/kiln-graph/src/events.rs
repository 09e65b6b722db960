//! Build operation events and notifiers for observability.
//!
//! Events are emitted as build operations start and finish so consumers can
//! observe progress, persist timings, render a progress bar, etc.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::operation::OperationCategory;

/// Events emitted while running build operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationEvent {
  /// An operation has started running.
  Started {
    id: u64,
    display_name: String,
    progress_display_name: Option<String>,
    category: OperationCategory,
  },

  /// An operation has finished running.
  Finished {
    id: u64,
    display_name: String,
    duration_ms: u64,
  },
}

/// Trait for receiving build operation events.
pub trait OperationNotifier: Send + Sync {
  fn notify(&self, event: OperationEvent);
}

/// A no-op notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl OperationNotifier for NoopNotifier {
  fn notify(&self, _event: OperationEvent) {}
}

/// A notifier that sends events to an unbounded channel.
///
/// Unbounded so a slow consumer never stalls a worker; volume is two events
/// per operation.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<OperationEvent>,
}

impl ChannelNotifier {
  pub fn new() -> (Self, mpsc::UnboundedReceiver<OperationEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self { sender }, receiver)
  }
}

impl OperationNotifier for ChannelNotifier {
  fn notify(&self, event: OperationEvent) {
    // Receiver dropped means nobody is listening any more.
    let _ = self.sender.send(event);
  }
}
