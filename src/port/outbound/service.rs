//! Lifecycle contract for supervised services.
//!
//! Every unit the orchestrator manages implements [`SupervisedService`]. The
//! orchestrator never inspects what a service computes; it only starts it,
//! probes the handle it returned, and stops it.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::id::ServiceName;
use crate::error::LifecycleError;

/// Opaque handle to one running incarnation of a service.
///
/// Cloning is cheap; all clones refer to the same incarnation. The service
/// implementation decides what the handle carries and recovers it with
/// [`downcast_ref`](Self::downcast_ref).
#[derive(Clone)]
pub struct ServiceHandle {
    id: Uuid,
    inner: Arc<dyn Any + Send + Sync>,
}

impl ServiceHandle {
    /// Wrap service-specific state in a new handle.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            inner: Arc::new(value),
        }
    }

    /// Unique identifier of this incarnation.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Borrow the wrapped state if it has type `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle").field("id", &self.id).finish()
    }
}

/// Context passed to [`SupervisedService::start`].
#[derive(Debug, Clone)]
pub struct StartContext {
    /// Service being started.
    pub service: ServiceName,
    /// Retry attempt index; `0` for a first start.
    pub attempt: u32,
    /// Cancelled when the orchestrator shuts down. Long starts should
    /// return early once this fires.
    pub cancellation: CancellationToken,
}

/// Context passed to [`SupervisedService::stop`].
#[derive(Debug, Clone)]
pub struct StopContext {
    /// Service being stopped.
    pub service: ServiceName,
    /// Time the orchestrator waits before abandoning the stop.
    pub grace: Duration,
}

/// Lifecycle operations every supervised service provides.
#[async_trait]
pub trait SupervisedService: Send + Sync {
    /// Start a new incarnation and return its handle.
    ///
    /// Must be safe to call again after a failed attempt.
    async fn start(&self, ctx: StartContext) -> Result<ServiceHandle, LifecycleError>;

    /// Stop the incarnation behind `handle` and release its resources.
    async fn stop(&self, handle: ServiceHandle, ctx: StopContext) -> Result<(), LifecycleError>;

    /// Report whether the incarnation is healthy.
    ///
    /// `Ok(false)` and `Err(_)` both count as a failed probe.
    async fn health_probe(&self, handle: &ServiceHandle) -> Result<bool, LifecycleError>;
}
