//! Spawning abstraction for tile fetch workers.
//!
//! The tile engine never owns a global runtime: whoever builds a loader hands
//! it an [`AsyncSpawner`], usually a [`TokioSpawner`] wrapping the
//! application's runtime.

use std::future::Future;
use std::pin::Pin;

/// Boxed future accepted by [`AsyncSpawner::spawn_boxed`]
pub type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A trait for spawning async tasks (object-safe version)
pub trait AsyncSpawner: Send + Sync + 'static {
    fn spawn_boxed(&self, future: BoxedTask) -> Box<dyn AsyncHandle>;
}

/// Handle to a spawned async task
pub trait AsyncHandle: Send + Sync {
    fn is_finished(&self) -> bool;
}

/// Spawn a future on `spawner`
pub fn spawn<F>(spawner: &dyn AsyncSpawner, future: F) -> Box<dyn AsyncHandle>
where
    F: Future<Output = ()> + Send + 'static,
{
    spawner.spawn_boxed(Box::pin(future))
}

#[cfg(feature = "tokio-runtime")]
pub use tokio_impl::TokioSpawner;

#[cfg(feature = "tokio-runtime")]
mod tokio_impl {
    use super::*;
    use crate::prelude::Arc;
    use crate::{MapError, Result};
    use ::tokio::runtime::{Builder, Handle, Runtime};
    use ::tokio::task::JoinHandle;

    /// Tokio-based async spawner
    #[derive(Clone)]
    pub struct TokioSpawner {
        handle: Handle,
        // Keeps an owned runtime alive for spawners built with `owned`
        _runtime: Option<Arc<Runtime>>,
    }

    impl TokioSpawner {
        /// Spawn onto an existing runtime
        pub fn from_handle(handle: Handle) -> Self {
            Self {
                handle,
                _runtime: None,
            }
        }

        /// Spawn onto the runtime the caller is running in
        pub fn current() -> Result<Self> {
            Handle::try_current()
                .map(Self::from_handle)
                .map_err(|e| MapError::Runtime(e.to_string()))
        }

        /// Start a dedicated multi-threaded runtime for applications that
        /// are not async themselves
        pub fn owned(worker_threads: usize) -> Result<Self> {
            let runtime = Builder::new_multi_thread()
                .worker_threads(worker_threads.max(1))
                .thread_name("tilescope-fetch")
                .enable_all()
                .build()?;
            log::debug!("started tile fetch runtime with {} workers", worker_threads.max(1));

            Ok(Self {
                handle: runtime.handle().clone(),
                _runtime: Some(Arc::new(runtime)),
            })
        }

        pub fn handle(&self) -> &Handle {
            &self.handle
        }
    }

    impl AsyncSpawner for TokioSpawner {
        fn spawn_boxed(&self, future: BoxedTask) -> Box<dyn AsyncHandle> {
            Box::new(TokioHandle(self.handle.spawn(future)))
        }
    }

    struct TokioHandle(JoinHandle<()>);

    impl AsyncHandle for TokioHandle {
        fn is_finished(&self) -> bool {
            self.0.is_finished()
        }
    }
}

#[cfg(all(test, feature = "tokio-runtime"))]
mod tests {
    use super::*;

    #[::tokio::test]
    async fn test_tokio_spawner() {
        let spawner = TokioSpawner::current().unwrap();
        let handle = spawn(&spawner, async {
            ::tokio::time::sleep(::tokio::time::Duration::from_millis(10)).await;
        });

        assert!(!handle.is_finished());

        ::tokio::time::sleep(::tokio::time::Duration::from_millis(50)).await;
        assert!(handle.is_finished());
    }

    #[test]
    fn test_current_outside_runtime() {
        assert!(TokioSpawner::current().is_err());
    }
}
