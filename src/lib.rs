// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
//! A declarative dataflow runtime.
//!
//! Users compose a hierarchical tree of [`module`] nodes whose methods
//! declare, via typed producer/consumer tuples, the records they emit and
//! consume; [`connection`]s wire those methods together (DIRECT, MERGE, or
//! SPLIT; sync or async); and a frozen [`graph::ExecutionGraph`] partitions
//! the result into sync-coupled processes, each driven on its own worker
//! thread, propagating outputs to dependents until the graph is quiescent
//! or shut down.
//!
//! ```ignore
//! use flowgraph::method::{Callable, SinkConfig};
//! use flowgraph::module::GraphBuilder;
//! use flowgraph::record::{DataTypeId, RecordBox};
//! use flowgraph::graph::ExecutionGraph;
//! use flowgraph::config::EngineConfig;
//!
//! let mut builder = GraphBuilder::new();
//! let root = builder.new_module();
//! // register methods and connections on `builder.module(root)`, then:
//! let graph = ExecutionGraph::new(builder, EngineConfig::default())?;
//! graph.execute()?;
//! # Ok::<(), flowgraph::error::Error>(())
//! ```
//!
//! This crate is the runtime core only. Record-field encoding, transport
//! across hosts, and the module bodies themselves are left to callers —
//! see [`record::Columnar`] for the seam an external schema subsystem can
//! hang a real implementation off of.

pub mod config;
pub mod connection;
pub mod error;
pub mod graph;
pub mod method;
pub mod module;
pub mod queue;
pub mod record;

pub use config::{EngineConfig, ExecutionMode};
pub use error::{Error, Result};
pub use graph::ExecutionGraph;
pub use method::{Callable, DataMethod, MethodId, SinkConfig};
pub use module::{GraphBuilder, ModuleHandle, ModuleId};
pub use record::{DataTypeId, Record, RecordBox};
