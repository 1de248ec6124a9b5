// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
//! The execution graph: partitions methods into sync-coupled processes,
//! computes a per-process layer plan, and drives each process on its own
//! worker thread until the graph is quiescent or shut down.

pub mod layering;
pub mod partition;
mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ahash::AHashMap;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::method::DataMethod;
use crate::module::GraphBuilder;

pub use partition::ProcessId;
use worker::ProcessRuntime;

/// A frozen, runnable dataflow graph built from a [`GraphBuilder`].
///
/// Construction partitions methods into processes, computes the layer
/// plan, and rejects a cyclic configuration; nothing about the method or
/// connection set can change afterward (see `module.rs` for the one
/// exception — blocking a connection before the graph is built).
pub struct ExecutionGraph {
    methods: Arc<Vec<DataMethod>>,
    process_of: Arc<Vec<ProcessId>>,
    runtimes: Arc<AHashMap<ProcessId, ProcessRuntime>>,
    config: EngineConfig,
    shutdown: Arc<AtomicBool>,
}

impl ExecutionGraph {
    /// Freeze `builder` into a runnable graph.
    #[tracing::instrument(skip_all)]
    pub fn new(builder: GraphBuilder, config: EngineConfig) -> Result<Self> {
        let methods = builder.methods;
        let process_of = partition::partition(&methods);
        let plan = layering::layer(&methods, &process_of)?;

        let mut runtimes: AHashMap<ProcessId, ProcessRuntime> = AHashMap::default();
        for (process_id, layers) in plan.layers_by_process {
            runtimes.insert(process_id, ProcessRuntime::new(layers));
        }
        // A process every one of whose methods turned out inactive gets no
        // layers from the planner; give it an empty runtime anyway so
        // every `process_of` entry resolves to something.
        for &process_id in &process_of {
            runtimes
                .entry(process_id)
                .or_insert_with(|| ProcessRuntime::new(Vec::new()));
        }

        tracing::info!(
            methods = methods.len(),
            processes = runtimes.len(),
            "execution graph assembled"
        );

        Ok(ExecutionGraph {
            methods: Arc::new(methods),
            process_of: Arc::new(process_of),
            runtimes: Arc::new(runtimes),
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// A clone of the shutdown flag; storing `true` into it requests a
    /// graceful stop of a concurrently running [`ExecutionGraph::execute`].
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Request a graceful shutdown. Equivalent to storing `true` into the
    /// handle returned by [`ExecutionGraph::shutdown_flag`].
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Run every process's worker thread until the graph is quiescent —
    /// no process running or ready, and none can become so without an
    /// external actor — or until shutdown is requested. Blocks the
    /// calling thread.
    pub fn execute(&self) -> Result<()> {
        worker::drive(
            self.methods.clone(),
            self.process_of.clone(),
            self.runtimes.clone(),
            &self.config,
            self.shutdown.clone(),
        )
    }

    /// [`ExecutionGraph::execute`], but first installs SIGINT/SIGTERM
    /// handlers (when `config.install_signal_handler`) that raise the
    /// shutdown flag, so a host binary gets Ctrl+C-triggers-graceful-stop
    /// behavior for free.
    pub fn execute_catching_signals(&self) -> Result<()> {
        if self.config.install_signal_handler {
            for sig in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
                signal_hook::flag::register(sig, self.shutdown.clone())
                    .map_err(|err| Error::Configuration(format!("failed to register signal handler: {err}")))?;
            }
        }
        self.execute()
    }

    /// Number of non-empty processes in the plan. Unstable: gated behind
    /// the `introspection` feature for tests and demos that assert on
    /// planner output rather than just externally observable behavior.
    #[cfg(feature = "introspection")]
    pub fn process_count(&self) -> usize {
        self.runtimes.values().filter(|r| !r.is_empty()).count()
    }

    /// Layer count of each non-empty process, in an unspecified order.
    #[cfg(feature = "introspection")]
    pub fn layer_counts(&self) -> Vec<usize> {
        self.runtimes
            .values()
            .filter(|r| !r.is_empty())
            .map(|r| r.layer_count())
            .collect()
    }
}
