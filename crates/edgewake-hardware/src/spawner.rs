//! Tokio-backed [`Spawner`].

use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{HardwareError, Result};
use crate::traits::Spawner;

/// Spawns deferred work on a Tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioSpawner {
    handle: Handle,
}

impl TokioSpawner {
    /// Spawner for the given runtime.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Spawner for the runtime the caller is running on.
    ///
    /// # Errors
    ///
    /// Returns an error when called outside a Tokio runtime.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| HardwareError::other(format!("no Tokio runtime: {e}")))
    }
}

impl Spawner for TokioSpawner {
    fn spawn(&self, name: &str, task: BoxFuture<'static, ()>) -> Result<JoinHandle<()>> {
        debug!("Spawning deferred task {}", name);
        Ok(self.handle.spawn(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_tokio_spawner_runs_task() {
        let spawner = TokioSpawner::current().unwrap();
        let ran = Arc::new(AtomicBool::new(false));

        let flag = ran.clone();
        let handle = spawner
            .spawn("test", async move { flag.store(true, Ordering::SeqCst) }.boxed())
            .unwrap();
        handle.await.unwrap();

        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_tokio_spawner_outside_runtime() {
        assert!(TokioSpawner::current().is_err());
    }
}
