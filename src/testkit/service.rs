//! Scripted [`SupervisedService`] for testing.
//!
//! [`ScriptedService`] pops pre-loaded start results and probe outcomes in
//! order, falling back to success once a script runs out. Optional delays
//! simulate slow or stuck starts, hanging probes and stuck stops. Services built with
//! [`ScriptedService::journaled`] append every call to a shared [`Journal`]
//! so tests can assert ordering across services.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{sleep, Instant};

use crate::error::LifecycleError;
use crate::port::outbound::service::{ServiceHandle, StartContext, StopContext, SupervisedService};

/// Kind of lifecycle call recorded in a [`Journal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    /// `start` was entered.
    Start,
    /// `start` returned a handle.
    Started,
    /// `stop` was entered.
    Stop,
    /// `stop` returned.
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub service: String,
    pub call: Call,
    pub at: Instant,
}

/// Call log shared by several scripted services.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<JournalEntry>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, service: &str, call: Call) {
        self.entries.lock().push(JournalEntry {
            service: service.to_string(),
            call,
            at: Instant::now(),
        });
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.lock().clone()
    }

    /// Services that made `call`, in call order.
    pub fn services(&self, call: Call) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.call == call)
            .map(|entry| entry.service.clone())
            .collect()
    }

    /// Index of the first `call` made by `service`.
    pub fn position(&self, service: &str, call: Call) -> Option<usize> {
        self.entries
            .lock()
            .iter()
            .position(|entry| entry.service == service && entry.call == call)
    }

    /// Time of the first `call` made by `service`.
    pub fn time_of(&self, service: &str, call: Call) -> Option<Instant> {
        self.entries
            .lock()
            .iter()
            .find(|entry| entry.service == service && entry.call == call)
            .map(|entry| entry.at)
    }
}

/// A mock service with scripted lifecycle outcomes.
pub struct ScriptedService {
    label: String,
    journal: Option<Journal>,
    start_results: Mutex<VecDeque<Result<(), LifecycleError>>>,
    always_fail_start: bool,
    probe_results: Mutex<VecDeque<bool>>,
    healthy: AtomicBool,
    start_delay: Duration,
    ignores_cancellation: bool,
    probe_delay: Duration,
    stop_delay: Duration,
    start_count: AtomicU32,
    probe_count: AtomicU32,
    stop_count: AtomicU32,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self {
            label: "scripted".to_string(),
            journal: None,
            start_results: Mutex::new(VecDeque::new()),
            always_fail_start: false,
            probe_results: Mutex::new(VecDeque::new()),
            healthy: AtomicBool::new(true),
            start_delay: Duration::ZERO,
            ignores_cancellation: false,
            probe_delay: Duration::ZERO,
            stop_delay: Duration::ZERO,
            start_count: AtomicU32::new(0),
            probe_count: AtomicU32::new(0),
            stop_count: AtomicU32::new(0),
        }
    }

    /// A service that always starts, always probes healthy and stops
    /// instantly.
    pub fn healthy() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Record calls under `label` in `journal`.
    pub fn journaled(label: impl Into<String>, journal: &Journal) -> Self {
        Self {
            label: label.into(),
            journal: Some(journal.clone()),
            ..Self::new()
        }
    }

    /// Fail the next `count` starts, then succeed.
    pub fn fail_starts(self, count: usize) -> Self {
        {
            let mut results = self.start_results.lock();
            for n in 0..count {
                results.push_back(Err(LifecycleError::Start(format!(
                    "scripted start failure {}",
                    n + 1
                ))));
            }
        }
        self
    }

    /// Fail every start.
    pub fn always_fail_start(mut self) -> Self {
        self.always_fail_start = true;
        self
    }

    /// Probe outcomes consumed in order before falling back to the
    /// [`set_healthy`](Self::set_healthy) flag.
    pub fn probe_script(self, results: impl IntoIterator<Item = bool>) -> Self {
        self.probe_results.lock().extend(results);
        self
    }

    pub fn start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// Sit out the start delay even after cancellation fires.
    pub fn ignore_cancellation(mut self) -> Self {
        self.ignores_cancellation = true;
        self
    }

    pub fn probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = delay;
        self
    }

    pub fn stop_delay(mut self, delay: Duration) -> Self {
        self.stop_delay = delay;
        self
    }

    /// Change the fallback probe outcome.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn start_calls(&self) -> u32 {
        self.start_count.load(Ordering::SeqCst)
    }

    pub fn probe_calls(&self) -> u32 {
        self.probe_count.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> u32 {
        self.stop_count.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        if let Some(journal) = &self.journal {
            journal.record(&self.label, call);
        }
    }
}

impl Default for ScriptedService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SupervisedService for ScriptedService {
    async fn start(&self, ctx: StartContext) -> Result<ServiceHandle, LifecycleError> {
        let incarnation = self.start_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.record(Call::Start);

        if self.ignores_cancellation {
            sleep(self.start_delay).await;
        } else if !self.start_delay.is_zero() {
            tokio::select! {
                () = ctx.cancellation.cancelled() => {
                    return Err(LifecycleError::Start("cancelled".to_string()));
                }
                () = sleep(self.start_delay) => {}
            }
        }

        if self.always_fail_start {
            return Err(LifecycleError::Start("scripted start failure".to_string()));
        }
        let scripted = self.start_results.lock().pop_front();
        if let Some(Err(e)) = scripted {
            return Err(e);
        }

        self.record(Call::Started);
        Ok(ServiceHandle::new(incarnation))
    }

    async fn stop(&self, _handle: ServiceHandle, _ctx: StopContext) -> Result<(), LifecycleError> {
        self.stop_count.fetch_add(1, Ordering::SeqCst);
        self.record(Call::Stop);
        if !self.stop_delay.is_zero() {
            sleep(self.stop_delay).await;
        }
        self.record(Call::Stopped);
        Ok(())
    }

    async fn health_probe(&self, _handle: &ServiceHandle) -> Result<bool, LifecycleError> {
        self.probe_count.fetch_add(1, Ordering::SeqCst);
        if !self.probe_delay.is_zero() {
            sleep(self.probe_delay).await;
        }
        let scripted = self.probe_results.lock().pop_front();
        Ok(scripted.unwrap_or_else(|| self.healthy.load(Ordering::SeqCst)))
    }
}
