// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
//! The per-process worker loop and the reactive-mode wake monitor.
//!
//! One OS thread drives each process: it walks the process's layer plan
//! forever, draining a per-layer work-list until every member is unready,
//! delivering each method's output to its active dependents, and parking
//! (in reactive mode) when the first layer has nothing left to do. A
//! single monitor thread owns the other end of a `flume` channel that
//! worker threads post to whenever a delivery lands on a first-layer
//! method of a currently idle process, and respawns that process's
//! worker.
//!
//! One refinement on top of the literal work-list algorithm: a method
//! with zero consumer slots (a source) is always `ready()` by definition,
//! so unconditionally requeuing "ready and has consumers" would spin a
//! source forever and starve every later layer in the same process. This
//! loop only requeues a method within the same pass when it has actual
//! slot arity — i.e., it just drained a genuine burst — and lets a
//! zero-arity source fire once per layer per outer sweep instead, which
//! is what actually drives a multi-layer sync pipeline forward.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ahash::AHashMap;

use crate::config::{EngineConfig, ExecutionMode};
use crate::error::{Error, Result};
use crate::graph::partition::ProcessId;
use crate::method::{DataMethod, MethodId, Payload};
use crate::record::RecordBox;

const POLL_INTERVAL: Duration = Duration::from_millis(5);
const MONITOR_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessState {
    Idle,
    Ready,
    Running,
}

/// The execution-time state for one process: its layer plan plus a
/// readiness flag the monitor and worker threads coordinate over.
pub(crate) struct ProcessRuntime {
    layers: Vec<Vec<MethodId>>,
    state: Mutex<ProcessState>,
}

impl ProcessRuntime {
    pub(crate) fn new(layers: Vec<Vec<MethodId>>) -> Self {
        ProcessRuntime {
            layers,
            state: Mutex::new(ProcessState::Idle),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    #[cfg_attr(not(feature = "introspection"), allow(dead_code))]
    pub(crate) fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn first_layer(&self) -> Option<&Vec<MethodId>> {
        self.layers.first()
    }

    fn is_first_layer_ready(&self, methods: &[DataMethod]) -> bool {
        match self.first_layer() {
            None => false,
            Some(first) => first.iter().all(|id| methods[id.0 as usize].ready()),
        }
    }
}

struct RunContext {
    methods: Arc<Vec<DataMethod>>,
    process_of: Arc<Vec<ProcessId>>,
    runtimes: Arc<AHashMap<ProcessId, ProcessRuntime>>,
    mode: ExecutionMode,
    shutdown: Arc<AtomicBool>,
    wake_tx: flume::Sender<ProcessId>,
}

/// Spawn and supervise every process's worker thread until the graph is
/// quiescent (no process running or ready, and none can ever become so
/// without an external actor) or `shutdown` is raised.
pub(crate) fn drive(
    methods: Arc<Vec<DataMethod>>,
    process_of: Arc<Vec<ProcessId>>,
    runtimes: Arc<AHashMap<ProcessId, ProcessRuntime>>,
    config: &EngineConfig,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let (wake_tx, wake_rx) = flume::unbounded();
    let ctx = Arc::new(RunContext {
        methods,
        process_of,
        runtimes,
        mode: config.mode,
        shutdown: shutdown.clone(),
        wake_tx,
    });

    let registry: Arc<Mutex<Vec<JoinHandle<Result<()>>>>> = Arc::new(Mutex::new(Vec::new()));

    for (&process_id, runtime) in ctx.runtimes.iter() {
        if runtime.is_empty() {
            continue;
        }
        let should_start =
            ctx.mode == ExecutionMode::Continuous || runtime.is_first_layer_ready(&ctx.methods);
        if should_start {
            *runtime.state.lock().unwrap() = ProcessState::Running;
            spawn_worker(&ctx, &registry, process_id);
        } else {
            tracing::debug!(process = process_id.0, "process starts idle");
        }
    }

    let monitor = {
        let ctx = ctx.clone();
        let registry = registry.clone();
        thread::spawn(move || run_monitor(ctx, wake_rx, registry))
    };

    let mut loop_error = None;
    loop {
        if let Some(err) = harvest(&registry) {
            tracing::error!(error = %err, "worker failed; requesting shutdown");
            loop_error = Some(err);
            ctx.shutdown.store(true, Ordering::Release);
            break;
        }
        if ctx.shutdown.load(Ordering::Acquire) {
            break;
        }
        if is_quiescent(&ctx, &registry) {
            tracing::info!("execution graph quiescent; no process has further work");
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }

    ctx.shutdown.store(true, Ordering::Release);
    let _ = monitor.join();

    let remaining = std::mem::take(&mut *registry.lock().unwrap());
    let grace_error = join_with_grace(remaining, config.grace_timeout);

    match loop_error.or(grace_error) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn spawn_worker(
    ctx: &Arc<RunContext>,
    registry: &Arc<Mutex<Vec<JoinHandle<Result<()>>>>>,
    process_id: ProcessId,
) {
    let ctx = ctx.clone();
    registry
        .lock()
        .unwrap()
        .push(thread::spawn(move || run_process(ctx, process_id)));
}

fn harvest(registry: &Arc<Mutex<Vec<JoinHandle<Result<()>>>>>) -> Option<Error> {
    let mut reg = registry.lock().unwrap();
    let mut idx = 0;
    while idx < reg.len() {
        if reg[idx].is_finished() {
            let handle = reg.remove(idx);
            if let Some(err) = join_one(handle) {
                return Some(err);
            }
        } else {
            idx += 1;
        }
    }
    None
}

fn join_one(handle: JoinHandle<Result<()>>) -> Option<Error> {
    match handle.join() {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(err),
        Err(_) => Some(Error::Panicked {
            method: "<process worker>",
            payload: "worker thread panicked".into(),
        }),
    }
}

fn is_quiescent(ctx: &RunContext, registry: &Arc<Mutex<Vec<JoinHandle<Result<()>>>>>) -> bool {
    if !registry.lock().unwrap().is_empty() {
        return false;
    }
    ctx.runtimes
        .values()
        .all(|runtime| runtime.is_empty() || *runtime.state.lock().unwrap() == ProcessState::Idle)
}

fn join_with_grace(mut handles: Vec<JoinHandle<Result<()>>>, grace: Duration) -> Option<Error> {
    let deadline = std::time::Instant::now() + grace;
    let mut first_error = None;
    while !handles.is_empty() && std::time::Instant::now() < deadline {
        let mut idx = 0;
        while idx < handles.len() {
            if handles[idx].is_finished() {
                let handle = handles.remove(idx);
                if let Some(err) = join_one(handle) {
                    first_error.get_or_insert(err);
                }
            } else {
                idx += 1;
            }
        }
        if !handles.is_empty() {
            thread::sleep(POLL_INTERVAL);
        }
    }
    if !handles.is_empty() {
        tracing::warn!(
            count = handles.len(),
            "grace period elapsed; abandoning unfinished worker threads"
        );
    }
    first_error
}

fn run_monitor(
    ctx: Arc<RunContext>,
    wake_rx: flume::Receiver<ProcessId>,
    registry: Arc<Mutex<Vec<JoinHandle<Result<()>>>>>,
) {
    loop {
        match wake_rx.recv_timeout(MONITOR_POLL) {
            Ok(process_id) => {
                if ctx.shutdown.load(Ordering::Acquire) {
                    break;
                }
                let runtime = &ctx.runtimes[&process_id];
                let mut state = runtime.state.lock().unwrap();
                if *state == ProcessState::Ready {
                    *state = ProcessState::Running;
                    drop(state);
                    tracing::debug!(process = process_id.0, "reactive wake-up; respawning worker");
                    spawn_worker(&ctx, &registry, process_id);
                }
            }
            Err(flume::RecvTimeoutError::Timeout) => {
                if ctx.shutdown.load(Ordering::Acquire) {
                    break;
                }
            }
            Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn run_process(ctx: Arc<RunContext>, process_id: ProcessId) -> Result<()> {
    let runtime = &ctx.runtimes[&process_id];
    let span = tracing::info_span!("process", id = process_id.0);
    let _guard = span.enter();
    tracing::debug!("worker starting");

    let outcome = (|| -> Result<()> {
        while !ctx.shutdown.load(Ordering::Acquire) {
            for (layer_idx, layer) in runtime.layers.iter().enumerate() {
                let mut pending: VecDeque<MethodId> = layer.iter().copied().collect();
                let mut idx = 0usize;
                while let Some(method_id) = pending.pop_front() {
                    if ctx.shutdown.load(Ordering::Acquire) {
                        return Ok(());
                    }
                    let method = &ctx.methods[method_id.0 as usize];
                    if !method.ready() {
                        pending.push_back(method_id);
                        idx += 1;
                        if idx >= pending.len() && layer_idx == 0 && ctx.mode == ExecutionMode::Reactive {
                            // Commit to `Idle` under the process's own lock, then
                            // re-check first-layer readiness before actually
                            // parking: a cross-process `deliver` can land on a
                            // first-layer method and see `Running` (because this
                            // worker hasn't reached this point yet) and so skip
                            // sending a wake, trusting this worker to notice the
                            // delivery itself. The re-check under the lock is
                            // what makes that trust valid — `wake_if_idle` can
                            // only ever observe `Idle` either strictly before or
                            // strictly after this critical section, never during
                            // it, so one side or the other always catches the
                            // delivery.
                            let mut state = runtime.state.lock().unwrap();
                            *state = ProcessState::Idle;
                            if runtime.is_first_layer_ready(&ctx.methods) {
                                *state = ProcessState::Running;
                                drop(state);
                                idx = 0;
                                continue;
                            }
                            drop(state);
                            tracing::debug!("process parked: first layer has no ready work");
                            return Ok(());
                        }
                        continue;
                    }
                    idx = 0;
                    let output = method.execute()?;
                    deliver(&ctx, method_id, process_id, &output)?;
                    if method.arity() > 0 && method.ready() && method.has_consumers() {
                        pending.push_back(method_id);
                    }
                }
            }
        }
        Ok(())
    })();

    tracing::debug!("worker stopping");
    outcome
}

fn deliver(
    ctx: &RunContext,
    from: MethodId,
    current_process: ProcessId,
    output: &Option<Vec<RecordBox>>,
) -> Result<()> {
    let Some(produced) = output else {
        return Ok(());
    };
    let method = &ctx.methods[from.0 as usize];
    for (dep_id, cfg) in method.active_dependents() {
        let payload = match cfg.split_producer_index {
            None => Payload::Tuple(produced.clone()),
            Some(slot) => Payload::Single(produced[slot as usize].clone()),
        };
        ctx.methods[dep_id.0 as usize].receive(from, payload)?;

        let dep_process = ctx.process_of[dep_id.0 as usize];
        if dep_process != current_process {
            wake_if_idle(ctx, dep_process, dep_id);
        }
    }
    Ok(())
}

fn wake_if_idle(ctx: &RunContext, process_id: ProcessId, dep_id: MethodId) {
    let Some(runtime) = ctx.runtimes.get(&process_id) else {
        return;
    };
    let is_first_layer_member = runtime
        .first_layer()
        .map(|first| first.contains(&dep_id))
        .unwrap_or(false);
    if !is_first_layer_member {
        return;
    }
    let mut state = runtime.state.lock().unwrap();
    if *state == ProcessState::Idle {
        *state = ProcessState::Ready;
        drop(state);
        let _ = ctx.wake_tx.send(process_id);
    }
}
