// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
//! The data method: a user callable plus its producer/consumer type
//! tuples, input queues, and dependency/dependent configuration.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::queue::InputQueue;
use crate::record::{DataTypeId, RecordBox};

/// Index into the engine's method array. Method adjacency is stored as
/// these indices rather than mutual `Arc` references, so the dependency
/// graph is acyclic in ownership terms (Design Note §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub(crate) u32);

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "method#{}", self.0)
    }
}

/// The value handed to `DataMethod::receive`.
#[derive(Debug)]
pub enum Payload {
    /// One record destined for a single slot.
    Single(RecordBox),
    /// A full tuple, one element per consumer slot, in slot order.
    Tuple(Vec<RecordBox>),
}

/// Configuration stored on the *consumer* side of an adjacency.
#[derive(Debug, Clone, Copy)]
pub struct DepConfig {
    pub sync: bool,
    pub merge_consumer_index: Option<u16>,
    pub active: bool,
}

/// Configuration stored on the *producer* side of an adjacency.
#[derive(Debug, Clone, Copy)]
pub struct DependentConfig {
    pub sync: bool,
    pub split_producer_index: Option<u16>,
    pub active: bool,
}

/// Per-slot sink configuration: `{capacity, sticky}`,
/// default `{1, false}`.
#[derive(Debug, Clone, Copy)]
pub struct SinkConfig {
    pub capacity: NonZeroUsize,
    pub sticky: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig {
            capacity: NonZeroUsize::new(1).unwrap(),
            sticky: false,
        }
    }
}

/// A user callable, lifted to operate on type-erased records. This is the
/// one permitted dynamic-dispatch seam in the engine's hot path, mirroring
/// how this lineage's task system erases futures behind a single vtable
/// rather than monomorphizing the executor itself.
pub trait Callable: Send {
    /// Invoked with exactly `consumes.len()` arguments in declared order.
    /// Must return `Ok(Some(v))` with `v.len() == produces.len()`, or
    /// `Ok(None)` if nothing was produced this invocation.
    fn call(&mut self, inputs: &[RecordBox]) -> Result<Option<Vec<RecordBox>>>;
}

impl<F> Callable for F
where
    F: FnMut(&[RecordBox]) -> Result<Option<Vec<RecordBox>>> + Send,
{
    fn call(&mut self, inputs: &[RecordBox]) -> Result<Option<Vec<RecordBox>>> {
        (self)(inputs)
    }
}

/// One unit of executable work: a wrapped callable plus its declared
/// produces/consumes type tuples, per-slot input queues, and dependency /
/// dependent configuration.
pub struct DataMethod {
    pub(crate) name: &'static str,
    pub(crate) produces: SmallVec<[DataTypeId; 4]>,
    pub(crate) consumes: SmallVec<[DataTypeId; 4]>,
    queues: Vec<InputQueue>,
    /// Bit `i` set means slot `i` is currently empty ("in `remaining`").
    /// Mutated both by the owning worker thread (on `execute`) and by
    /// producer threads delivering data (on `receive`), hence atomic
    /// rather than a plain `HashSet<usize>`.
    empty_slots: AtomicU64,
    pub(crate) dependency_config: AHashMap<MethodId, DepConfig>,
    pub(crate) dependent_config: AHashMap<MethodId, DependentConfig>,
    callable: Mutex<Box<dyn Callable>>,
}

impl DataMethod {
    pub fn new(
        name: &'static str,
        callable: Box<dyn Callable>,
        produces: impl Into<SmallVec<[DataTypeId; 4]>>,
        consumes: impl Into<SmallVec<[DataTypeId; 4]>>,
        sink_configs: &[SinkConfig],
    ) -> Self {
        let consumes = consumes.into();
        assert!(
            sink_configs.len() == consumes.len() || sink_configs.is_empty(),
            "sink_configs must be empty or one entry per consumer slot"
        );
        let queues = (0..consumes.len())
            .map(|i| {
                let cfg = sink_configs.get(i).copied().unwrap_or_default();
                InputQueue::new(cfg.capacity, cfg.sticky)
            })
            .collect();

        let empty_slots = if consumes.is_empty() {
            0
        } else {
            (1u64 << consumes.len()) - 1
        };

        DataMethod {
            name,
            produces: produces.into(),
            consumes,
            queues,
            empty_slots: AtomicU64::new(empty_slots),
            dependency_config: AHashMap::new(),
            dependent_config: AHashMap::new(),
            callable: Mutex::new(callable),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_source(&self) -> bool {
        self.consumes.is_empty()
    }

    pub fn is_sink(&self) -> bool {
        self.produces.is_empty()
    }

    pub fn arity(&self) -> usize {
        self.consumes.len()
    }

    /// `true` iff every input slot is non-empty (or the method is a
    /// source, which has no slots and is always ready).
    pub fn ready(&self) -> bool {
        self.empty_slots.load(Ordering::Acquire) == 0
    }

    pub fn has_consumers(&self) -> bool {
        !self.dependent_config.is_empty()
    }

    pub(crate) fn queue(&self, slot: usize) -> &InputQueue {
        &self.queues[slot]
    }

    fn mark_slot_state(&self, slot: usize, empty: bool) {
        let bit = 1u64 << slot;
        if empty {
            self.empty_slots.fetch_or(bit, Ordering::AcqRel);
        } else {
            self.empty_slots.fetch_and(!bit, Ordering::AcqRel);
        }
    }

    pub fn add_dependency(&mut self, from: MethodId, config: DepConfig) {
        self.dependency_config.insert(from, config);
    }

    pub fn add_dependent(&mut self, to: MethodId, config: DependentConfig) {
        self.dependent_config.insert(to, config);
    }

    pub fn block_dependency(&mut self, from: MethodId) {
        if let Some(cfg) = self.dependency_config.get_mut(&from) {
            cfg.active = false;
        }
    }

    pub fn block_dependent(&mut self, to: MethodId) {
        if let Some(cfg) = self.dependent_config.get_mut(&to) {
            cfg.active = false;
        }
    }

    pub fn active_dependencies(&self) -> impl Iterator<Item = (MethodId, DepConfig)> + '_ {
        self.dependency_config
            .iter()
            .filter(|(_, cfg)| cfg.active)
            .map(|(id, cfg)| (*id, *cfg))
    }

    pub fn active_dependents(&self) -> impl Iterator<Item = (MethodId, DependentConfig)> + '_ {
        self.dependent_config
            .iter()
            .filter(|(_, cfg)| cfg.active)
            .map(|(id, cfg)| (*id, *cfg))
    }

    /// Deliver `payload` from `from`.
    pub fn receive(&self, from: MethodId, payload: Payload) -> Result<()> {
        let config = *self.dependency_config.get(&from).ok_or_else(|| {
            Error::Configuration(format!(
                "method `{}` received data from an unregistered dependency",
                self.name
            ))
        })?;

        match (config.merge_consumer_index, payload) {
            (None, Payload::Tuple(items)) => {
                if items.len() != self.queues.len() {
                    return Err(Error::TypeMismatch {
                        method: self.name,
                        expected: self.queues.len(),
                        got: items.len(),
                    });
                }
                for (slot, item) in items.into_iter().enumerate() {
                    self.queues[slot].append(item, config.sync);
                    self.mark_slot_state(slot, self.queues[slot].is_empty());
                }
            }
            (None, Payload::Single(item)) => {
                if self.queues.len() != 1 {
                    return Err(Error::TypeMismatch {
                        method: self.name,
                        expected: self.queues.len(),
                        got: 1,
                    });
                }
                self.queues[0].append(item, config.sync);
                self.mark_slot_state(0, self.queues[0].is_empty());
            }
            (Some(slot), Payload::Single(item)) => {
                let slot = slot as usize;
                self.queues[slot].append(item, config.sync);
                self.mark_slot_state(slot, self.queues[slot].is_empty());
            }
            (Some(slot), Payload::Tuple(mut items)) if items.len() == 1 => {
                let slot = slot as usize;
                self.queues[slot].append(items.remove(0), config.sync);
                self.mark_slot_state(slot, self.queues[slot].is_empty());
            }
            (Some(_), Payload::Tuple(items)) => {
                return Err(Error::TypeMismatch {
                    method: self.name,
                    expected: 1,
                    got: items.len(),
                });
            }
        }
        Ok(())
    }

    /// Pop one item from every input queue, invoke the callable, and
    /// return its output. Precondition: `self.ready()`.
    pub fn execute(&self) -> Result<Option<Vec<RecordBox>>> {
        let mut inputs = Vec::with_capacity(self.queues.len());
        for (slot, queue) in self.queues.iter().enumerate() {
            let item = queue
                .pop()
                .expect("execute() called while a slot's queue was empty");
            self.mark_slot_state(slot, queue.is_empty());
            inputs.push(item);
        }

        let output = self
            .callable
            .lock()
            .unwrap()
            .call(&inputs)
            .map_err(|err| match err {
                Error::UserMethod { .. } | Error::Panicked { .. } => err,
                other => Error::UserMethod {
                    method: self.name,
                    source: Box::new(OpaqueError(other.to_string())),
                },
            })?;

        if let Some(produced) = &output {
            if produced.len() != self.produces.len() {
                return Err(Error::TypeMismatch {
                    method: self.name,
                    expected: self.produces.len(),
                    got: produced.len(),
                });
            }
        }

        Ok(output)
    }
}

impl fmt::Debug for DataMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataMethod")
            .field("name", &self.name)
            .field("arity", &self.arity())
            .field("ready", &self.ready())
            .finish()
    }
}

#[derive(Debug)]
struct OpaqueError(String);

impl fmt::Display for OpaqueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for OpaqueError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(name: &'static str, produces: usize, consumes: usize) -> DataMethod {
        DataMethod::new(
            name,
            Box::new(move |inputs: &[RecordBox]| {
                let out: Vec<RecordBox> = inputs.to_vec();
                let _ = out;
                if produces == 0 {
                    Ok(None)
                } else {
                    Ok(Some((0..produces).map(|i| RecordBox::new(i as i32)).collect()))
                }
            }),
            (0..produces).map(|_| DataTypeId::of::<i32>()).collect::<SmallVec<[_; 4]>>(),
            (0..consumes).map(|_| DataTypeId::of::<i32>()).collect::<SmallVec<[_; 4]>>(),
            &[],
        )
    }

    #[test]
    fn source_is_always_ready() {
        let m = method("src", 1, 0);
        assert!(m.ready());
        assert!(m.is_source());
    }

    #[test]
    fn consumer_not_ready_until_every_slot_filled() {
        let mut m = method("sink", 0, 2);
        let producer = MethodId(1);
        m.add_dependency(
            producer,
            DepConfig {
                sync: false,
                merge_consumer_index: None,
                active: true,
            },
        );
        assert!(!m.ready());
        m.receive(
            producer,
            Payload::Tuple(vec![RecordBox::new(1i32), RecordBox::new(2i32)]),
        )
        .unwrap();
        assert!(m.ready());
    }

    #[test]
    fn execute_returns_arity_matched_output() {
        let m = method("passthrough", 2, 1);
        m.queues[0].append(RecordBox::new(1i32), false);
        let out = m.execute().unwrap();
        assert_eq!(out.unwrap().len(), 2);
    }

    #[test]
    fn merge_delivers_to_its_own_slot_only() {
        let mut m = method("merge_sink", 0, 2);
        let p0 = MethodId(1);
        let p1 = MethodId(2);
        m.add_dependency(
            p0,
            DepConfig {
                sync: false,
                merge_consumer_index: Some(0),
                active: true,
            },
        );
        m.add_dependency(
            p1,
            DepConfig {
                sync: false,
                merge_consumer_index: Some(1),
                active: true,
            },
        );
        m.receive(p0, Payload::Single(RecordBox::new(10i32))).unwrap();
        assert!(!m.ready());
        m.receive(p1, Payload::Single(RecordBox::new(20i32))).unwrap();
        assert!(m.ready());
    }
}
