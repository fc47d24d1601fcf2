//! Conductor seam and the in-process memory conductor.
//!
//! Scenario bodies talk to conductors only through [`Conductor`]; the
//! orchestrator obtains them from a [`ConductorBackend`]. [`MemoryBackend`]
//! hosts everything in-process:
//!
//! ```text
//! call() ──mpsc──▶ worker ──▶ handler ──oneshot──▶ caller
//!                    │
//!                    └─ publish delay ─▶ job dropped ─▶ settle() wakes
//! ```
//!
//! A plain `call` returns as soon as the handler answered; its effects are only
//! held once the publish delay elapsed. `call_sync` and `settle` wait for that.
//!
//! Every queued job carries a pending guard, so pending work is released
//! however the job ends: published, rejected by a closed queue, dropped with a
//! cancelled caller, or lost with the worker.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{Mutex, Notify, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::ConductorLoggerConfig;
use crate::error::{ConductorError, HarnessError};
use crate::metrics as m;
use crate::orchestrator::panic_message;
use crate::transport::TransportConfig;

/// Boxed, sendable future used by the dyn-compatible traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

const CALL_QUEUE_CAPACITY: usize = 64;

/// A zome function call addressed to one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    pub agent: String,
    pub zome: String,
    pub func: String,
    pub payload: Value,
}

/// An agent hosted by a conductor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub name: String,
    /// Stable address, unique per agent
    pub address: String,
}

/// What a backend needs to start one conductor.
#[derive(Debug, Clone)]
pub struct ConductorSpec {
    pub name: String,
    pub transport: TransportConfig,
    pub logger: ConductorLoggerConfig,
}

/// A running conductor.
pub trait Conductor: Send + Sync {
    fn name(&self) -> &str;

    /// Install an agent; returns the existing one if already installed.
    fn add_agent(&self, agent: &str) -> BoxFuture<'_, Result<AgentInfo, HarnessError>>;

    /// Call and return once the conductor answered. Effects may still be in flight.
    fn call(&self, request: CallRequest) -> BoxFuture<'_, Result<Value, HarnessError>>;

    /// Call and return once the effects of the call are held.
    fn call_sync(&self, request: CallRequest) -> BoxFuture<'_, Result<Value, HarnessError>>;

    /// Wait until no work is pending.
    fn settle(&self) -> BoxFuture<'_, ()>;

    fn shutdown(&self) -> BoxFuture<'_, Result<(), HarnessError>>;
}

/// Starts conductors for a session.
pub trait ConductorBackend: Send + Sync {
    fn spawn(&self, spec: ConductorSpec) -> BoxFuture<'_, Result<Arc<dyn Conductor>, HarnessError>>;
}

/// Zome behavior of a memory conductor. `Err` becomes a failed call.
pub type ZomeHandler = Arc<dyn Fn(&CallRequest) -> Result<Value, String> + Send + Sync>;

/// Handler answering every call with `{"Ok": payload}`.
pub fn echo_handler() -> ZomeHandler {
    Arc::new(|request: &CallRequest| Ok(json!({ "Ok": request.payload })))
}

/// Backend hosting conductors in this process.
#[derive(Clone)]
pub struct MemoryBackend {
    handler: ZomeHandler,
    publish_delay: Duration,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            handler: echo_handler(),
            publish_delay: Duration::from_millis(10),
        }
    }

    pub fn with_handler(mut self, handler: ZomeHandler) -> Self {
        self.handler = handler;
        self
    }

    /// Delay between answering a call and its effects being held.
    pub fn with_publish_delay(mut self, delay: Duration) -> Self {
        self.publish_delay = delay;
        self
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("publish_delay", &self.publish_delay)
            .finish_non_exhaustive()
    }
}

impl ConductorBackend for MemoryBackend {
    fn spawn(&self, spec: ConductorSpec) -> BoxFuture<'_, Result<Arc<dyn Conductor>, HarnessError>> {
        Box::pin(async move {
            let conductor = MemoryConductor::start(spec, Arc::clone(&self.handler), self.publish_delay);
            Ok(conductor as Arc<dyn Conductor>)
        })
    }
}

struct Job {
    request: CallRequest,
    reply: oneshot::Sender<Result<Value, String>>,
    _pending: PendingGuard,
}

/// One unit of pending work; released on drop.
struct PendingGuard {
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl PendingGuard {
    fn acquire(pending: &Arc<AtomicUsize>, idle: &Arc<Notify>) -> Self {
        pending.fetch_add(1, Ordering::SeqCst);
        Self {
            pending: Arc::clone(pending),
            idle: Arc::clone(idle),
        }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// In-process conductor driven by a single worker task.
pub struct MemoryConductor {
    name: String,
    agents: Mutex<HashMap<String, AgentInfo>>,
    tx: Mutex<Option<mpsc::Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
    calls_handled: Arc<AtomicU64>,
}

impl MemoryConductor {
    /// Start the worker and return the conductor.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(spec: ConductorSpec, handler: ZomeHandler, publish_delay: Duration) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(CALL_QUEUE_CAPACITY);
        let pending = Arc::new(AtomicUsize::new(0));
        let idle = Arc::new(Notify::new());
        let calls_handled = Arc::new(AtomicU64::new(0));

        tracing::debug!(
            conductor = %spec.name,
            transport = %spec.transport.kind(),
            log_type = %spec.logger.log_type,
            "starting memory conductor"
        );

        let worker = tokio::spawn(run_worker(WorkerState {
            name: spec.name.clone(),
            rx,
            handler,
            publish_delay,
            state_dump: spec.logger.state_dump,
            calls_handled: Arc::clone(&calls_handled),
        }));

        Arc::new(Self {
            name: spec.name,
            agents: Mutex::new(HashMap::new()),
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            pending,
            idle,
            calls_handled,
        })
    }

    /// Number of calls the worker has answered.
    pub fn calls_handled(&self) -> u64 {
        self.calls_handled.load(Ordering::SeqCst)
    }

    async fn dispatch(&self, request: CallRequest) -> Result<Value, HarnessError> {
        if !self.agents.lock().await.contains_key(&request.agent) {
            return Err(ConductorError::UnknownAgent {
                conductor: self.name.clone(),
                agent: request.agent,
            }
            .into());
        }

        let sender = self
            .tx
            .lock()
            .await
            .clone()
            .ok_or_else(|| ConductorError::Closed(self.name.clone()))?;

        let zome = request.zome.clone();
        let func = request.func.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let job = Job {
            request,
            reply: reply_tx,
            _pending: PendingGuard::acquire(&self.pending, &self.idle),
        };
        if sender.send(job).await.is_err() {
            return Err(ConductorError::Closed(self.name.clone()).into());
        }
        metrics::counter!(m::CONDUCTOR_CALLS_TOTAL).increment(1);

        match reply_rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(reason)) => Err(ConductorError::CallFailed { zome, func, reason }.into()),
            Err(_) => Err(ConductorError::Closed(self.name.clone()).into()),
        }
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Conductor for MemoryConductor {
    fn name(&self) -> &str {
        &self.name
    }

    fn add_agent(&self, agent: &str) -> BoxFuture<'_, Result<AgentInfo, HarnessError>> {
        let agent = agent.to_owned();
        Box::pin(async move {
            let mut agents = self.agents.lock().await;
            let info = agents
                .entry(agent.clone())
                .or_insert_with(|| AgentInfo {
                    name: agent,
                    address: uuid::Uuid::new_v4().to_string(),
                })
                .clone();
            Ok(info)
        })
    }

    fn call(&self, request: CallRequest) -> BoxFuture<'_, Result<Value, HarnessError>> {
        Box::pin(self.dispatch(request))
    }

    fn call_sync(&self, request: CallRequest) -> BoxFuture<'_, Result<Value, HarnessError>> {
        Box::pin(async move {
            let result = self.dispatch(request).await;
            self.wait_idle().await;
            result
        })
    }

    fn settle(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.wait_idle())
    }

    fn shutdown(&self) -> BoxFuture<'_, Result<(), HarnessError>> {
        Box::pin(async move {
            // Dropping the sender lets the worker drain and exit.
            self.tx.lock().await.take();
            if let Some(worker) = self.worker.lock().await.take() {
                if let Err(e) = worker.await {
                    tracing::warn!(conductor = %self.name, error = %e, "conductor worker ended abnormally");
                }
            }
            tracing::debug!(conductor = %self.name, "memory conductor stopped");
            Ok(())
        })
    }
}

struct WorkerState {
    name: String,
    rx: mpsc::Receiver<Job>,
    handler: ZomeHandler,
    publish_delay: Duration,
    state_dump: bool,
    calls_handled: Arc<AtomicU64>,
}

async fn run_worker(mut state: WorkerState) {
    while let Some(job) = state.rx.recv().await {
        let handler = &state.handler;
        let result = panic::catch_unwind(AssertUnwindSafe(|| handler(&job.request)))
            .unwrap_or_else(|payload| {
                let reason = format!("handler panicked: {}", panic_message(payload));
                tracing::error!(
                    conductor = %state.name,
                    zome = %job.request.zome,
                    func = %job.request.func,
                    reason = %reason,
                    "zome handler panicked"
                );
                Err(reason)
            });
        let handled = state.calls_handled.fetch_add(1, Ordering::SeqCst) + 1;
        // Caller may have been cancelled; the effect is still published.
        let _ = job.reply.send(result);

        if !state.publish_delay.is_zero() {
            tokio::time::sleep(state.publish_delay).await;
        }

        if state.state_dump {
            tracing::debug!(
                conductor = %state.name,
                calls_handled = handled,
                last_zome = %job.request.zome,
                last_func = %job.request.func,
                "state dump"
            );
        }
    }
}
