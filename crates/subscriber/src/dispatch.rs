//! Callback dispatch
//!
//! The connection task never calls host code. It posts [`UpdateEvent`]s
//! into a bounded channel; a dedicated OS thread drains the channel and
//! invokes whatever callback is registered at that moment.

use log::{debug, error};
use parking_lot::RwLock;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;

use tickcast_core::Notification;

pub const DISPATCH_THREAD_NAME: &str = "tickcast-dispatch";

/// What the host gets told about
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateEvent {
    /// A notification arrived on the prices topic
    Notification(Notification),
    /// The connection was re-established; notifications may have been
    /// missed and current state should be fetched again
    Resync,
}

pub type UpdateCallback = Arc<dyn Fn(&UpdateEvent) + Send + Sync>;

/// At most one registered callback; registering replaces the previous one
#[derive(Clone, Default)]
pub struct CallbackSlot {
    inner: Arc<RwLock<Option<UpdateCallback>>>,
}

impl CallbackSlot {
    /// Returns true if a previous callback was replaced
    pub fn register(&self, callback: UpdateCallback) -> bool {
        self.inner.write().replace(callback).is_some()
    }

    pub fn clear(&self) {
        self.inner.write().take();
    }

    pub fn is_registered(&self) -> bool {
        self.inner.read().is_some()
    }

    /// Invoke the current callback, if any. The lock is released before
    /// the call so a callback may re-register itself.
    pub fn invoke(&self, event: &UpdateEvent) -> bool {
        let callback = self.inner.read().clone();
        match callback {
            Some(cb) => {
                if catch_unwind(AssertUnwindSafe(|| cb(event))).is_err() {
                    error!("Update callback panicked; dispatcher continues");
                }
                true
            }
            None => false,
        }
    }
}

pub(crate) fn spawn_dispatcher(
    mut events: mpsc::Receiver<UpdateEvent>,
    slot: CallbackSlot,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(DISPATCH_THREAD_NAME.to_string())
        .spawn(move || {
            while let Some(event) = events.blocking_recv() {
                if !slot.invoke(&event) {
                    debug!("No callback registered, dropping {:?}", event);
                }
            }
            debug!("Dispatcher stopped");
        })
}
