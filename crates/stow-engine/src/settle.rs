//! Single-assignment outcome of a write attempt.
//!
//! An attempt streams the spool file to a node while the node answers on
//! the same request, so a read failure and a response can both produce an
//! outcome. [`Settler`] keeps the first and drops the rest.

use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

/// Create a settler and the receiver of its outcome.
pub(crate) fn settlement<T>() -> (Settler<T>, oneshot::Receiver<T>) {
    let (tx, rx) = oneshot::channel();
    (
        Settler {
            tx: Arc::new(Mutex::new(Some(tx))),
        },
        rx,
    )
}

/// Write side of a settlement; clones settle the same outcome.
pub(crate) struct Settler<T> {
    tx: Arc<Mutex<Option<oneshot::Sender<T>>>>,
}

impl<T> Clone for Settler<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> Settler<T> {
    /// Settle with `value`. Returns `false` if already settled.
    pub(crate) fn settle(&self, value: T) -> bool {
        let tx = match self.tx.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match tx {
            Some(tx) => {
                // Receiver gone means nobody waits for the outcome.
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }
}
