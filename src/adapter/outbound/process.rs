//! OS process backed service.
//!
//! [`CommandService`] supervises an external program. A start spawns the
//! program, a probe checks the child is still alive (and optionally that a
//! TCP address accepts connections), and a stop sends `SIGTERM` and waits
//! for the child to exit. Children are killed if their handle is dropped.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::LifecycleError;
use crate::port::outbound::service::{ServiceHandle, StartContext, StopContext, SupervisedService};

/// What to run and how to check it.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub workdir: Option<PathBuf>,
    /// TCP address that must accept a connection for a probe to pass.
    pub probe_addr: Option<String>,
    /// Bound on the TCP connect.
    pub probe_timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            workdir: None,
            probe_addr: None,
            probe_timeout: Duration::from_secs(5),
        }
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn probe_addr(mut self, addr: impl Into<String>, timeout: Duration) -> Self {
        self.probe_addr = Some(addr.into());
        self.probe_timeout = timeout;
        self
    }
}

/// Running child process held inside a [`ServiceHandle`].
struct RunningProcess {
    pid: Option<u32>,
    child: Mutex<Child>,
}

/// [`SupervisedService`] that runs an external command.
#[derive(Debug, Clone)]
pub struct CommandService {
    spec: CommandSpec,
}

impl CommandService {
    #[must_use]
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }

    #[must_use]
    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.spec.program);
        command
            .args(&self.spec.args)
            .envs(&self.spec.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.spec.workdir {
            command.current_dir(dir);
        }
        command
    }

    async fn port_open(&self, addr: &str) -> bool {
        match timeout(self.spec.probe_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(addr, error = %e, "Probe connect failed");
                false
            }
            Err(_) => {
                debug!(addr, "Probe connect timed out");
                false
            }
        }
    }
}

fn process_of<'a>(handle: &'a ServiceHandle, op: &str) -> Result<&'a RunningProcess, String> {
    handle
        .downcast_ref::<RunningProcess>()
        .ok_or_else(|| format!("{op}: handle does not belong to a command service"))
}

#[cfg(unix)]
fn terminate(pid: u32, child: &mut Child) -> std::io::Result<()> {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return child.start_kill();
    };
    // SAFETY: kill(2) has no memory-safety preconditions; pid belongs to our child.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn terminate(_pid: u32, child: &mut Child) -> std::io::Result<()> {
    child.start_kill()
}

#[async_trait]
impl SupervisedService for CommandService {
    async fn start(&self, ctx: StartContext) -> Result<ServiceHandle, LifecycleError> {
        let mut child = self.command().spawn().map_err(|e| {
            LifecycleError::Start(format!("failed to spawn '{}': {e}", self.spec.program))
        })?;

        match child.try_wait() {
            Ok(Some(status)) => {
                return Err(LifecycleError::Start(format!(
                    "'{}' exited immediately ({status})",
                    self.spec.program
                )));
            }
            Ok(None) => {}
            Err(e) => return Err(LifecycleError::Start(e.to_string())),
        }

        let pid = child.id();
        info!(
            service = %ctx.service,
            attempt = ctx.attempt,
            pid,
            program = %self.spec.program,
            "Process spawned"
        );
        Ok(ServiceHandle::new(RunningProcess {
            pid,
            child: Mutex::new(child),
        }))
    }

    async fn stop(&self, handle: ServiceHandle, ctx: StopContext) -> Result<(), LifecycleError> {
        let process = process_of(&handle, "stop").map_err(LifecycleError::Stop)?;
        let mut child = process.child.lock().await;

        if let Ok(Some(status)) = child.try_wait() {
            debug!(service = %ctx.service, %status, "Process already exited");
            return Ok(());
        }

        let sent = match process.pid {
            Some(pid) => terminate(pid, &mut child),
            None => child.start_kill(),
        };
        if let Err(e) = sent {
            warn!(service = %ctx.service, error = %e, "Failed to signal process");
        }

        // Leave part of the grace period for the forced kill.
        let soft = ctx.grace.mul_f64(0.75);
        match timeout(soft, child.wait()).await {
            Ok(Ok(status)) => {
                info!(service = %ctx.service, %status, "Process exited");
                Ok(())
            }
            Ok(Err(e)) => Err(LifecycleError::Stop(e.to_string())),
            Err(_) => {
                warn!(service = %ctx.service, "Process ignored SIGTERM, killing");
                child
                    .kill()
                    .await
                    .map_err(|e| LifecycleError::Stop(e.to_string()))?;
                Err(LifecycleError::Stop(format!(
                    "process did not exit within {soft:?} and was killed"
                )))
            }
        }
    }

    async fn health_probe(&self, handle: &ServiceHandle) -> Result<bool, LifecycleError> {
        let process = process_of(handle, "probe").map_err(LifecycleError::Probe)?;
        {
            let mut child = process.child.lock().await;
            match child.try_wait() {
                Ok(Some(status)) => {
                    return Err(LifecycleError::Probe(format!("process exited ({status})")));
                }
                Ok(None) => {}
                Err(e) => return Err(LifecycleError::Probe(e.to_string())),
            }
        }

        match &self.spec.probe_addr {
            Some(addr) => Ok(self.port_open(addr).await),
            None => Ok(true),
        }
    }
}
