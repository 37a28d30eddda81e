//! The pool of worker addresses that are free to take a task.
//!
//! Newly started workers and workers that just finished a task both land in
//! the same queue, so the scheduler never has to tell them apart. There is
//! no way to deregister: a worker whose call fails is simply never put back.

use tokio::sync::mpsc;
use tracing::trace;

/// Receiving end of the pool. Owned by whoever drives the scheduler.
#[derive(Debug)]
pub struct Registry {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

/// Cheap, cloneable handle to announce an available worker.
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    tx: mpsc::UnboundedSender<String>,
}

impl RegistryHandle {
    /// Makes `address` available for dispatch.
    ///
    /// Returns `false` once the [`Registry`] is gone.
    pub fn register(&self, address: impl Into<String>) -> bool {
        let address = address.into();
        trace!(worker = %address, "worker available");
        self.tx.send(address).is_ok()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// A registry that already knows `addresses`.
    pub fn with_workers<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let registry = Self::new();
        for address in addresses {
            registry.release(address);
        }
        registry
    }

    pub fn handle(&self) -> RegistryHandle {
        RegistryHandle {
            tx: self.tx.clone(),
        }
    }

    /// Waits for the next available worker.
    ///
    /// The registry keeps a sender of its own, so this only returns `None`
    /// if that invariant is broken.
    pub async fn next(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Takes an available worker without waiting.
    pub fn try_next(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    /// Puts a worker back into the pool.
    pub fn release(&self, address: impl Into<String>) {
        // cannot fail: self.rx is alive
        let _ = self.tx.send(address.into());
    }

    /// Drains the workers that are currently available.
    pub fn drain_available(&mut self) -> Vec<String> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}
