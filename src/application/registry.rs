//! Service registry: the single source of truth for service state.
//!
//! The registry owns every [`ServiceRuntimeRecord`]. All reads and writes go
//! through one lock, so a [`snapshot`](ServiceRegistry::snapshot) is a
//! consistent point-in-time copy across services, and
//! [`transition`](ServiceRegistry::transition) is an atomic compare-and-set
//! that rejects stale writers instead of overwriting their state.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::application::descriptor::ServiceDescriptor;
use crate::domain::id::ServiceName;
use crate::domain::state::ServiceState;
use crate::error::OrchestrationError;
use crate::port::outbound::service::ServiceHandle;

/// Number of recent transitions kept per service.
pub const HISTORY_LIMIT: usize = 32;

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionEntry {
    pub from: ServiceState,
    pub to: ServiceState,
    pub at: DateTime<Utc>,
}

/// Result of a successful compare-and-set transition.
#[derive(Debug)]
pub struct Transition {
    pub from: ServiceState,
    pub to: ServiceState,
    /// Handle detached from the record because the new state cannot hold it.
    pub released: Option<ServiceHandle>,
}

/// Mutable runtime record of one service.
#[derive(Debug, Clone)]
pub struct ServiceRuntimeRecord {
    state: ServiceState,
    consecutive_failures: u32,
    retry_attempts: u32,
    restarts: u32,
    last_transition: Instant,
    last_transition_at: DateTime<Utc>,
    handle: Option<ServiceHandle>,
    generation: u64,
    monitor: Option<CancellationToken>,
    blocked_on: Vec<ServiceName>,
    last_error: Option<String>,
    started_at: Option<DateTime<Utc>>,
    last_probe_at: Option<DateTime<Utc>>,
    history: VecDeque<TransitionEntry>,
}

impl ServiceRuntimeRecord {
    fn new() -> Self {
        Self {
            state: ServiceState::Stopped,
            consecutive_failures: 0,
            retry_attempts: 0,
            restarts: 0,
            last_transition: Instant::now(),
            last_transition_at: Utc::now(),
            handle: None,
            generation: 0,
            monitor: None,
            blocked_on: Vec::new(),
            last_error: None,
            started_at: None,
            last_probe_at: None,
            history: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> ServiceState {
        self.state
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    #[must_use]
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    /// Successful restarts over the process lifetime.
    #[must_use]
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    #[must_use]
    pub fn last_transition_at(&self) -> DateTime<Utc> {
        self.last_transition_at
    }

    #[must_use]
    pub fn since_transition(&self) -> Duration {
        self.last_transition.elapsed()
    }

    #[must_use]
    pub fn handle(&self) -> Option<&ServiceHandle> {
        self.handle.as_ref()
    }

    /// Incarnation counter, bumped each time the service reaches `Running`
    /// with a fresh handle.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn blocked_on(&self) -> &[ServiceName] {
        &self.blocked_on
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[must_use]
    pub fn history(&self) -> impl Iterator<Item = &TransitionEntry> {
        self.history.iter()
    }

    fn apply(&mut self, to: ServiceState) -> Transition {
        let from = self.state;
        let now = Utc::now();

        self.state = to;
        self.last_transition = Instant::now();
        self.last_transition_at = now;

        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(TransitionEntry { from, to, at: now });

        if to.ends_monitoring() {
            if let Some(monitor) = self.monitor.take() {
                monitor.cancel();
            }
        }
        let released = if matches!(to, ServiceState::Running | ServiceState::Degraded) {
            None
        } else {
            self.handle.take()
        };
        if matches!(to, ServiceState::Stopped | ServiceState::Failed) {
            self.started_at = None;
        }

        Transition { from, to, released }
    }
}

/// Point-in-time copy of one service for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceSnapshot {
    pub name: ServiceName,
    pub state: ServiceState,
    pub consecutive_failures: u32,
    pub retry_attempts: u32,
    pub restarts: u32,
    #[serde(skip)]
    pub since_transition: Duration,
    pub last_transition_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_probe_at: Option<DateTime<Utc>>,
    pub blocked_on: Vec<ServiceName>,
    pub last_error: Option<String>,
    pub history: Vec<TransitionEntry>,
}

struct Entry {
    descriptor: Arc<ServiceDescriptor>,
    record: ServiceRuntimeRecord,
}

#[derive(Default)]
struct Inner {
    order: Vec<ServiceName>,
    entries: HashMap<ServiceName, Entry>,
}

/// Registry of service descriptors and their runtime records.
#[derive(Default)]
pub struct ServiceRegistry {
    inner: RwLock<Inner>,
}

impl ServiceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor. Its record starts in `Stopped`.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::DuplicateService`] on a name collision.
    pub fn register(&self, descriptor: ServiceDescriptor) -> Result<(), OrchestrationError> {
        let mut inner = self.inner.write();
        let name = descriptor.name().clone();
        if inner.entries.contains_key(&name) {
            return Err(OrchestrationError::DuplicateService { name });
        }
        inner.order.push(name.clone());
        inner.entries.insert(
            name,
            Entry {
                descriptor: Arc::new(descriptor),
                record: ServiceRuntimeRecord::new(),
            },
        );
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().order.is_empty()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().entries.contains_key(name)
    }

    /// Registered names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<ServiceName> {
        self.inner.read().order.clone()
    }

    /// Descriptor registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::UnknownService`] for unregistered names.
    pub fn descriptor(&self, name: &str) -> Result<Arc<ServiceDescriptor>, OrchestrationError> {
        self.read_entry(name, |entry| Arc::clone(&entry.descriptor))
    }

    /// Copy of the runtime record registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::UnknownService`] for unregistered names.
    pub fn get(&self, name: &str) -> Result<ServiceRuntimeRecord, OrchestrationError> {
        self.read_entry(name, |entry| entry.record.clone())
    }

    /// Current state of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::UnknownService`] for unregistered names.
    pub fn state(&self, name: &str) -> Result<ServiceState, OrchestrationError> {
        self.read_entry(name, |entry| entry.record.state)
    }

    /// Atomically move `name` from `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::InvalidTransition`] when the current
    /// state is not `from` or the lifecycle table forbids `from -> to`, and
    /// [`OrchestrationError::UnknownService`] for unregistered names. A
    /// rejected transition leaves the record untouched.
    pub fn transition(
        &self,
        name: &str,
        from: ServiceState,
        to: ServiceState,
    ) -> Result<Transition, OrchestrationError> {
        self.write_record(name, |service, record| {
            check_transition(service, record, from, to)?;
            let transition = record.apply(to);
            debug!(service = %service, from = %from, to = %to, "State transition");
            Ok(transition)
        })
    }

    /// `Failed -> Starting` with the retry and failure counters reset.
    pub(crate) fn begin_manual_restart(
        &self,
        name: &str,
    ) -> Result<Transition, OrchestrationError> {
        self.write_record(name, |service, record| {
            check_transition(service, record, ServiceState::Failed, ServiceState::Starting)?;
            record.retry_attempts = 0;
            record.consecutive_failures = 0;
            record.last_error = None;
            Ok(record.apply(ServiceState::Starting))
        })
    }

    /// `Stopped -> Starting`, clearing any recorded blockers.
    pub(crate) fn begin_start(&self, name: &str) -> Result<Transition, OrchestrationError> {
        self.write_record(name, |service, record| {
            check_transition(service, record, ServiceState::Stopped, ServiceState::Starting)?;
            record.blocked_on.clear();
            Ok(record.apply(ServiceState::Starting))
        })
    }

    /// Move `from -> Running` and install a fresh incarnation.
    ///
    /// Returns the new generation. `monitor` is cancelled when the service
    /// later leaves the running states.
    pub(crate) fn mark_running(
        &self,
        name: &str,
        from: ServiceState,
        handle: ServiceHandle,
        monitor: CancellationToken,
    ) -> Result<u64, OrchestrationError> {
        self.write_record(name, |service, record| {
            check_transition(service, record, from, ServiceState::Running)?;
            record.apply(ServiceState::Running);
            if from == ServiceState::Restarting {
                record.restarts = record.restarts.saturating_add(1);
            }
            record.generation += 1;
            record.handle = Some(handle);
            record.monitor = Some(monitor);
            record.consecutive_failures = 0;
            record.blocked_on.clear();
            record.started_at = Some(Utc::now());
            Ok(record.generation)
        })
    }

    /// Reset the probe failure counter of the current incarnation.
    ///
    /// Returns `None` when `generation` is stale.
    pub(crate) fn record_probe_success(
        &self,
        name: &str,
        generation: u64,
    ) -> Result<Option<u32>, OrchestrationError> {
        self.write_record(name, |_, record| {
            if record.generation != generation {
                return Ok(None);
            }
            let previous = record.consecutive_failures;
            record.consecutive_failures = 0;
            record.last_probe_at = Some(Utc::now());
            Ok(Some(previous))
        })
    }

    /// Count a failed probe against the current incarnation.
    ///
    /// Returns the new consecutive failure count, or `None` when
    /// `generation` is stale.
    pub(crate) fn record_probe_failure(
        &self,
        name: &str,
        generation: u64,
        reason: &str,
    ) -> Result<Option<u32>, OrchestrationError> {
        self.write_record(name, |_, record| {
            if record.generation != generation {
                return Ok(None);
            }
            record.consecutive_failures = record.consecutive_failures.saturating_add(1);
            record.last_probe_at = Some(Utc::now());
            record.last_error = Some(reason.to_string());
            Ok(Some(record.consecutive_failures))
        })
    }

    /// Consume one retry attempt; returns the attempts used so far.
    pub(crate) fn record_attempt(&self, name: &str) -> Result<u32, OrchestrationError> {
        self.write_record(name, |_, record| {
            record.retry_attempts = record.retry_attempts.saturating_add(1);
            Ok(record.retry_attempts)
        })
    }

    pub(crate) fn reset_attempts(&self, name: &str) -> Result<(), OrchestrationError> {
        self.write_record(name, |_, record| {
            record.retry_attempts = 0;
            Ok(())
        })
    }

    pub(crate) fn record_error(&self, name: &str, error: &str) -> Result<(), OrchestrationError> {
        self.write_record(name, |_, record| {
            record.last_error = Some(error.to_string());
            Ok(())
        })
    }

    /// Record the dependencies holding back a `Stopped` service.
    pub(crate) fn set_blocked(
        &self,
        name: &str,
        blocked_on: Vec<ServiceName>,
    ) -> Result<(), OrchestrationError> {
        self.write_record(name, |_, record| {
            record.blocked_on = blocked_on;
            Ok(())
        })
    }

    /// Consistent copy of every record, in registration order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ServiceSnapshot> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|name| inner.entries.get(name).map(|entry| (name, &entry.record)))
            .map(|(name, record)| ServiceSnapshot {
                name: name.clone(),
                state: record.state,
                consecutive_failures: record.consecutive_failures,
                retry_attempts: record.retry_attempts,
                restarts: record.restarts,
                since_transition: record.last_transition.elapsed(),
                last_transition_at: record.last_transition_at,
                started_at: record.started_at,
                last_probe_at: record.last_probe_at,
                blocked_on: record.blocked_on.clone(),
                last_error: record.last_error.clone(),
                history: record.history.iter().cloned().collect(),
            })
            .collect()
    }

    fn read_entry<T>(
        &self,
        name: &str,
        read: impl FnOnce(&Entry) -> T,
    ) -> Result<T, OrchestrationError> {
        let inner = self.inner.read();
        inner
            .entries
            .get(name)
            .map(read)
            .ok_or_else(|| OrchestrationError::UnknownService { name: name.into() })
    }

    fn write_record<T>(
        &self,
        name: &str,
        write: impl FnOnce(&ServiceName, &mut ServiceRuntimeRecord) -> Result<T, OrchestrationError>,
    ) -> Result<T, OrchestrationError> {
        let mut inner = self.inner.write();
        let Some(entry) = inner.entries.get_mut(name) else {
            return Err(OrchestrationError::UnknownService { name: name.into() });
        };
        write(entry.descriptor.name(), &mut entry.record)
    }
}

fn check_transition(
    service: &ServiceName,
    record: &ServiceRuntimeRecord,
    from: ServiceState,
    to: ServiceState,
) -> Result<(), OrchestrationError> {
    if record.state != from || !from.can_transition_to(to) {
        warn!(
            service = %service,
            from = %from,
            to = %to,
            actual = %record.state,
            "Rejected state transition"
        );
        return Err(OrchestrationError::InvalidTransition {
            service: service.clone(),
            from,
            to,
            actual: record.state,
        });
    }
    Ok(())
}
