// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
//! Declarative edges between producer and consumer methods.

use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::method::{DataMethod, DepConfig, DependentConfig, MethodId};
use crate::record::DataTypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    Direct,
    Merge,
    Split,
}

/// A declarative edge. Equality and hashing are direction-sensitive and
/// ignore `sync`/`kind`/`blocked` — two connections are
/// the same connection iff `(producers, consumers, data)` match.
#[derive(Debug, Clone)]
pub struct Connection {
    pub producers: SmallVec<[MethodId; 1]>,
    pub consumers: SmallVec<[MethodId; 1]>,
    pub data: SmallVec<[DataTypeId; 4]>,
    pub sync: bool,
    pub kind: ConnectionKind,
    blocked: bool,
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.producers == other.producers
            && self.consumers == other.consumers
            && self.data == other.data
    }
}
impl Eq for Connection {}

impl std::hash::Hash for Connection {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.producers.hash(state);
        self.consumers.hash(state);
        self.data.hash(state);
    }
}

impl Connection {
    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    /// Flip `active = false` on the connection itself and on every linked
    /// dependency/dependent configuration entry. Idempotent: a second call
    /// observes the same state as the first.
    pub fn block(&mut self, methods: &mut [DataMethod]) {
        self.blocked = true;
        for (producer_id, consumer_id, _, _) in self.edges() {
            methods[consumer_id.0 as usize].block_dependency(producer_id);
            methods[producer_id.0 as usize].block_dependent(consumer_id);
        }
    }

    fn edges(&self) -> impl Iterator<Item = (MethodId, MethodId, Option<u16>, Option<u16>)> + '_ {
        let kind = self.kind;
        self.producers.iter().enumerate().flat_map(move |(p_idx, &producer_id)| {
            self.consumers.iter().enumerate().map(move |(c_idx, &consumer_id)| {
                let merge_consumer_index = matches!(kind, ConnectionKind::Merge).then_some(p_idx as u16);
                let split_producer_index = matches!(kind, ConnectionKind::Split).then_some(c_idx as u16);
                (producer_id, consumer_id, merge_consumer_index, split_producer_index)
            })
        })
    }
}

fn check_sync_slot(method: &DataMethod, slot: usize) -> Result<()> {
    let queue = method.queue(slot);
    if queue.capacity().get() != 1 || queue.sticky() {
        return Err(Error::Configuration(format!(
            "sync connection requires capacity=1 and sticky=false on method `{}` slot {slot}",
            method.name()
        )));
    }
    Ok(())
}

/// Construct a [`Connection`] and perform the `add_dependency` /
/// `add_dependent` wiring. The fourth construction step
/// (type presence on the endpoint) is enforced by the caller, which
/// resolves `producers`/`consumers` via each module's producer/consumer
/// registry — a method id can only reach this function if it was found
/// under the given data-type key.
pub fn build_connection(
    methods: &mut [DataMethod],
    producers: SmallVec<[MethodId; 1]>,
    consumers: SmallVec<[MethodId; 1]>,
    data: SmallVec<[DataTypeId; 4]>,
    sync: bool,
) -> Result<Connection> {
    if producers.len() > 1 && consumers.len() > 1 {
        return Err(Error::Configuration(
            "cannot connect multiple producers to multiple consumers directly; \
             use a single producer or consumer, or create one connection per pair"
                .into(),
        ));
    }

    let kind = if producers.len() > 1 {
        if producers.len() != data.len() {
            return Err(Error::Configuration(format!(
                "MERGE connection needs one data type per producer: {} producers, {} types",
                producers.len(),
                data.len()
            )));
        }
        ConnectionKind::Merge
    } else if consumers.len() > 1 {
        if consumers.len() != data.len() {
            return Err(Error::Configuration(format!(
                "SPLIT connection needs one data type per consumer: {} consumers, {} types",
                consumers.len(),
                data.len()
            )));
        }
        ConnectionKind::Split
    } else {
        ConnectionKind::Direct
    };

    if sync {
        match kind {
            ConnectionKind::Direct => {
                let consumer = &methods[consumers[0].0 as usize];
                for slot in 0..consumer.arity() {
                    check_sync_slot(consumer, slot)?;
                }
            }
            ConnectionKind::Split => {
                check_sync_slot(&methods[consumers[0].0 as usize], 0)?;
                for &consumer_id in &consumers[1..] {
                    check_sync_slot(&methods[consumer_id.0 as usize], 0)?;
                }
            }
            ConnectionKind::Merge => {
                let consumer_id = consumers[0];
                for slot in 0..producers.len() {
                    check_sync_slot(&methods[consumer_id.0 as usize], slot)?;
                }
            }
        }
    }

    let connection = Connection {
        producers: producers.clone(),
        consumers: consumers.clone(),
        data,
        sync,
        kind,
        blocked: false,
    };

    for (producer_id, consumer_id, merge_consumer_index, split_producer_index) in connection.edges() {
        methods[consumer_id.0 as usize].add_dependency(
            producer_id,
            DepConfig {
                sync,
                merge_consumer_index,
                active: true,
            },
        );
        methods[producer_id.0 as usize].add_dependent(
            consumer_id,
            DependentConfig {
                sync,
                split_producer_index,
                active: true,
            },
        );
    }

    Ok(connection)
}
