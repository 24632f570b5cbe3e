// src/exec/backend.rs

//! Pluggable hand-off of assignments to the execution layer.
//!
//! The runtime talks to an `AssignmentSink` instead of a raw mpsc sender.
//! This makes it easy to swap in a recording sink in tests.
//!
//! - `ChannelAssignmentSink` forwards assignments over an mpsc channel to
//!   whatever applies them to live instances.
//! - [`super::simulated::SimulatedExecutor`] applies them to an in-memory
//!   cluster and reports the new observed state back to the loop.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::criteria::Notification;
use crate::errors::{Result, TaskdagError};
use crate::rebalance::ResourceAssignment;

/// Boxed future returned by sink methods.
pub type SinkFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Trait abstracting where computed assignments go.
pub trait AssignmentSink: Send {
    /// Hand over the assignments produced by one tick.
    fn apply_assignments(&mut self, assignments: Vec<ResourceAssignment>) -> SinkFuture<'_>;

    /// Deliver out-of-band notifications about job transitions.
    ///
    /// Default: drop them.
    fn publish_notifications(&mut self, _notifications: Vec<Notification>) -> SinkFuture<'_> {
        Box::pin(async { Ok(()) })
    }
}

/// Sink that forwards every assignment over an mpsc channel.
#[derive(Debug, Clone)]
pub struct ChannelAssignmentSink {
    tx: mpsc::Sender<ResourceAssignment>,
    notifications: Option<mpsc::Sender<Notification>>,
}

impl ChannelAssignmentSink {
    pub fn new(tx: mpsc::Sender<ResourceAssignment>) -> Self {
        Self {
            tx,
            notifications: None,
        }
    }

    pub fn with_notifications(mut self, tx: mpsc::Sender<Notification>) -> Self {
        self.notifications = Some(tx);
        self
    }
}

impl AssignmentSink for ChannelAssignmentSink {
    fn apply_assignments(&mut self, assignments: Vec<ResourceAssignment>) -> SinkFuture<'_> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            for assignment in assignments {
                tx.send(assignment)
                    .await
                    .map_err(|e| TaskdagError::ChannelClosed(e.to_string()))?;
            }
            Ok(())
        })
    }

    fn publish_notifications(&mut self, notifications: Vec<Notification>) -> SinkFuture<'_> {
        let tx = self.notifications.clone();

        Box::pin(async move {
            let Some(tx) = tx else {
                return Ok(());
            };
            for notification in notifications {
                tx.send(notification)
                    .await
                    .map_err(|e| TaskdagError::ChannelClosed(e.to_string()))?;
            }
            Ok(())
        })
    }
}
