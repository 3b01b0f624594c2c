use std::sync::Mutex;

use futures::future::BoxFuture;

/// Runs fire-and-forget work after a request has returned to its caller.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, name: &'static str, task: BoxFuture<'static, ()>);
}

/// Spawns each task onto the current tokio runtime, detached.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDispatcher;

impl Dispatcher for TokioDispatcher {
    fn dispatch(&self, name: &'static str, task: BoxFuture<'static, ()>) {
        tracing::trace!("spawning background task {name}");
        tokio::spawn(task);
    }
}

/// Buffers tasks until [`QueueDispatcher::run_pending`] is awaited.
#[derive(Default)]
pub struct QueueDispatcher {
    pending: Mutex<Vec<(&'static str, BoxFuture<'static, ()>)>>,
}

impl QueueDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn pending_names(&self) -> Vec<&'static str> {
        self.pending
            .lock()
            .map(|p| p.iter().map(|(name, _)| *name).collect())
            .unwrap_or_default()
    }

    /// Run queued tasks in submission order, including any queued while running.
    /// Returns how many ran.
    pub async fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let batch = match self.pending.lock() {
                Ok(mut pending) => std::mem::take(&mut *pending),
                Err(_) => return ran,
            };
            if batch.is_empty() {
                return ran;
            }
            for (_, task) in batch {
                task.await;
                ran += 1;
            }
        }
    }
}

impl Dispatcher for QueueDispatcher {
    fn dispatch(&self, name: &'static str, task: BoxFuture<'static, ()>) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.push((name, task));
        }
    }
}
