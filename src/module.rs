// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
//! The module tree and the graph-assembly builder.
//!
//! Per Design Note §9, method adjacency is indices into arrays owned by
//! the engine rather than mutually-referenced owners. This module extends
//! the same idiom one level up: a [`GraphBuilder`] owns every
//! [`DataMethod`] and every module node in one flat arena, and
//! [`ModuleHandle`] is a thin, borrow-checked cursor into it. This avoids
//! the `Rc<RefCell<_>>` tangle a literal tree-of-owned-trait-objects
//! translation of the source framework's `Module` class would otherwise
//! require, while keeping the exact same user-facing surface (`add_method`,
//! `create_connection`, `block_connection`, `add_modules`).

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::connection::{build_connection, Connection};
use crate::error::{Error, Result};
use crate::method::{Callable, DataMethod, MethodId, SinkConfig};
use crate::record::DataTypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(u32);

type TypeKey = SmallVec<[DataTypeId; 4]>;

#[derive(Default)]
struct ModuleNode {
    children: Vec<ModuleId>,
    local_methods: Vec<MethodId>,
    local_connections: Vec<usize>,
    producers_by_type: AHashMap<TypeKey, MethodId>,
    consumers_by_type: AHashMap<TypeKey, MethodId>,
}

/// Owns every method and module node in the tree until it is handed to
/// [`crate::graph::ExecutionGraph::new`], which freezes it.
#[derive(Default)]
pub struct GraphBuilder {
    pub(crate) methods: Vec<DataMethod>,
    nodes: Vec<ModuleNode>,
    pub(crate) connections: Vec<Connection>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        GraphBuilder::default()
    }

    /// Create a new, unparented module node and return a handle to it.
    pub fn new_module(&mut self) -> ModuleId {
        self.nodes.push(ModuleNode::default());
        ModuleId((self.nodes.len() - 1) as u32)
    }

    pub fn module(&mut self, id: ModuleId) -> ModuleHandle<'_> {
        ModuleHandle { builder: self, id }
    }

    pub(crate) fn methods(&self) -> &[DataMethod] {
        &self.methods
    }

    pub(crate) fn methods_mut(&mut self) -> &mut [DataMethod] {
        &mut self.methods
    }
}

/// A borrow-checked cursor over one module node in a [`GraphBuilder`].
pub struct ModuleHandle<'b> {
    builder: &'b mut GraphBuilder,
    id: ModuleId,
}

impl<'b> ModuleHandle<'b> {
    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// Register a method local to this module. `produces`/`consumes` key
    /// uniqueness is enforced per module.
    pub fn add_method(
        &mut self,
        name: &'static str,
        callable: Box<dyn Callable>,
        produces: &[DataTypeId],
        consumes: &[DataTypeId],
        sink_configs: &[SinkConfig],
    ) -> Result<MethodId> {
        let produces_key: TypeKey = produces.iter().copied().collect();
        let consumes_key: TypeKey = consumes.iter().copied().collect();
        let node = &self.builder.nodes[self.id.0 as usize];

        if !produces_key.is_empty() && node.producers_by_type.contains_key(&produces_key) {
            return Err(Error::Configuration(format!(
                "multiple producers defined for data type tuple on method `{name}`"
            )));
        }
        if !consumes_key.is_empty() && node.consumers_by_type.contains_key(&consumes_key) {
            return Err(Error::Configuration(format!(
                "multiple consumers defined for data type tuple on method `{name}`"
            )));
        }

        self.builder
            .methods
            .push(DataMethod::new(name, callable, produces_key.clone(), consumes_key.clone(), sink_configs));
        let method_id = MethodId((self.builder.methods.len() - 1) as u32);

        let node = &mut self.builder.nodes[self.id.0 as usize];
        node.local_methods.push(method_id);
        if !produces_key.is_empty() {
            node.producers_by_type.insert(produces_key, method_id);
        }
        if !consumes_key.is_empty() {
            node.consumers_by_type.insert(consumes_key, method_id);
        }

        Ok(method_id)
    }

    fn resolve_producer_by(&self, module: ModuleId, key: &TypeKey) -> Result<MethodId> {
        self.builder.nodes[module.0 as usize]
            .producers_by_type
            .get(key)
            .copied()
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "module has no producer registered for data type tuple {key:?}"
                ))
            })
    }

    fn resolve_consumer_by(&self, module: ModuleId, key: &TypeKey) -> Result<MethodId> {
        self.builder.nodes[module.0 as usize]
            .consumers_by_type
            .get(key)
            .copied()
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "module has no consumer registered for data type tuple {key:?}"
                ))
            })
    }

    fn resolve_producer(&self, module: ModuleId, data_type: DataTypeId) -> Result<MethodId> {
        self.resolve_producer_by(module, &SmallVec::from_elem(data_type, 1))
    }

    fn resolve_consumer(&self, module: ModuleId, data_type: DataTypeId) -> Result<MethodId> {
        self.resolve_consumer_by(module, &SmallVec::from_elem(data_type, 1))
    }

    /// Create a connection between one or more producer modules and one or
    /// more consumer modules for the given data types.
    ///
    /// A single-sided endpoint (one producer, or one consumer) is resolved
    /// by its module's full `data` tuple key — the method that produces or
    /// consumes exactly that tuple. A many-sided endpoint (MERGE's multiple
    /// producers, SPLIT's multiple consumers) is resolved one data type at a
    /// time, paired positionally with `data`.
    pub fn create_connection(
        &mut self,
        data: &[DataTypeId],
        producers: &[ModuleId],
        consumers: &[ModuleId],
        sync: bool,
    ) -> Result<()> {
        let data_key: TypeKey = data.iter().copied().collect();

        let producer_methods: SmallVec<[MethodId; 1]> = if producers.len() > 1 {
            producers
                .iter()
                .zip(data)
                .map(|(&module, &ty)| self.resolve_producer(module, ty))
                .collect::<Result<_>>()?
        } else {
            SmallVec::from_elem(self.resolve_producer_by(producers[0], &data_key)?, 1)
        };

        let consumer_methods: SmallVec<[MethodId; 1]> = if consumers.len() > 1 {
            consumers
                .iter()
                .zip(data)
                .map(|(&module, &ty)| self.resolve_consumer(module, ty))
                .collect::<Result<_>>()?
        } else {
            SmallVec::from_elem(self.resolve_consumer_by(consumers[0], &data_key)?, 1)
        };

        let connection = build_connection(
            &mut self.builder.methods,
            producer_methods,
            consumer_methods,
            data_key,
            sync,
        )?;

        if self.builder.connections.contains(&connection) {
            return Err(Error::Configuration(
                "connection already exists for this (producer, consumer, data) triple".into(),
            ));
        }

        self.builder.connections.push(connection);
        let connection_idx = self.builder.connections.len() - 1;
        self.builder.nodes[self.id.0 as usize]
            .local_connections
            .push(connection_idx);
        Ok(())
    }

    /// Block every connection matching the given (optional) producer and
    /// consumer modules and the given data type tuple.
    pub fn block_connection(
        &mut self,
        data: &[DataTypeId],
        producer: Option<ModuleId>,
        consumer: Option<ModuleId>,
    ) -> Result<()> {
        let data_key: TypeKey = data.iter().copied().collect();
        let producer_method = producer
            .map(|m| self.resolve_producer_by(m, &data_key))
            .transpose()?;
        let consumer_method = consumer
            .map(|m| self.resolve_consumer_by(m, &data_key))
            .transpose()?;

        let mut visited = std::collections::HashSet::new();
        let mut indices = Vec::new();
        self.collect_connections(self.id, &mut visited, &mut indices);

        let to_block: Vec<usize> = indices
            .into_iter()
            .filter(|&idx| {
                let connection = &self.builder.connections[idx];
                let matches_producer = producer_method
                    .map(|m| connection.producers.contains(&m))
                    .unwrap_or(true);
                let matches_consumer = consumer_method
                    .map(|m| connection.consumers.contains(&m))
                    .unwrap_or(true);
                matches_producer && matches_consumer && connection.data == data_key
            })
            .collect();

        for idx in to_block {
            self.builder.connections[idx].block(&mut self.builder.methods);
        }
        Ok(())
    }

    /// Add `children` as child modules of this one. Refuses to add a
    /// child that carries a connection duplicating (by key) one already
    /// present in this subtree.
    pub fn add_modules(&mut self, children: &[ModuleId]) -> Result<()> {
        for &child in children {
            let existing: Vec<Connection> = self.connections_recursive().cloned().collect();
            let incoming: Vec<Connection> = {
                let handle = ModuleHandle {
                    builder: &mut *self.builder,
                    id: child,
                };
                handle.connections_recursive().cloned().collect()
            };
            for incoming_conn in &incoming {
                if existing.iter().any(|c| c == incoming_conn) {
                    return Err(Error::Configuration(
                        "connection already exists between these endpoints for this data type"
                            .into(),
                    ));
                }
            }
            self.builder.nodes[self.id.0 as usize].children.push(child);
        }
        Ok(())
    }

    /// All methods reachable from this module, recursively, cycle-free via
    /// an explicit visited set mirroring the source framework's `_memo`.
    pub fn methods_recursive(&self) -> Vec<MethodId> {
        let mut visited = std::collections::HashSet::new();
        let mut out = Vec::new();
        self.collect_methods(self.id, &mut visited, &mut out);
        out
    }

    fn collect_methods(
        &self,
        module: ModuleId,
        visited: &mut std::collections::HashSet<ModuleId>,
        out: &mut Vec<MethodId>,
    ) {
        if !visited.insert(module) {
            return;
        }
        let node = &self.builder.nodes[module.0 as usize];
        out.extend(node.local_methods.iter().copied());
        for &child in &node.children {
            self.collect_methods(child, visited, out);
        }
    }

    pub fn connections_recursive(&self) -> impl Iterator<Item = &Connection> + '_ {
        let mut visited = std::collections::HashSet::new();
        let mut indices = Vec::new();
        self.collect_connections(self.id, &mut visited, &mut indices);
        indices.into_iter().map(move |i| &self.builder.connections[i])
    }

    fn collect_connections(
        &self,
        module: ModuleId,
        visited: &mut std::collections::HashSet<ModuleId>,
        out: &mut Vec<usize>,
    ) {
        if !visited.insert(module) {
            return;
        }
        let node = &self.builder.nodes[module.0 as usize];
        out.extend(node.local_connections.iter().copied());
        for &child in &node.children {
            self.collect_connections(child, visited, out);
        }
    }
}
