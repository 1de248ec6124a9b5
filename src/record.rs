// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
//! The record value: an opaque, cloneable payload moving along edges.
//!
//! The wire format deliberately leaves the columnar encoding of record fields to
//! an external schema subsystem; this module models only the seam the
//! engine actually touches: a stable type identity and a cheap clone.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A numeric, `Copy` stand-in for a record's [`TypeId`], suitable for use in
/// `SmallVec`-backed sorted-array keys (Design Note §9) instead of
/// `HashMap<Vec<TypeId>, _>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataTypeId(u64);

impl DataTypeId {
    pub fn of<T: 'static>() -> Self {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        TypeId::of::<T>().hash(&mut hasher);
        DataTypeId(hasher.finish())
    }
}

impl fmt::Display for DataTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataTypeId({:#x})", self.0)
    }
}

/// Optional projection to a columnar byte form for cross-thread transport.
///
/// The engine never calls this; it exists purely as the seam an external
/// record-schema subsystem can hang a real implementation off of.
pub trait Columnar {
    fn to_columnar(&self) -> Option<Vec<u8>> {
        None
    }
}

/// Blanket opaque-record bound: anything the engine can move between
/// threads and clone into multiple queues.
pub trait Record: Any + Send + Sync + fmt::Debug {
    fn type_id(&self) -> DataTypeId;
    fn clone_box(&self) -> RecordBox;
    fn as_any(&self) -> &dyn Any;
}

impl<T> Record for T
where
    T: Any + Send + Sync + Clone + fmt::Debug,
{
    fn type_id(&self) -> DataTypeId {
        DataTypeId::of::<T>()
    }

    fn clone_box(&self) -> RecordBox {
        RecordBox(Arc::new(self.clone()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A type-erased, cheaply cloneable record value. Cloning a `RecordBox`
/// bumps an `Arc` refcount rather than copying the payload, which is what
/// lets a sticky queue hand out repeated reads of the same value without
/// the underlying record type paying for it.
#[derive(Clone)]
pub struct RecordBox(Arc<dyn Record>);

impl RecordBox {
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send + Sync + Clone + fmt::Debug,
    {
        RecordBox(Arc::new(value))
    }

    pub fn data_type(&self) -> DataTypeId {
        self.0.type_id()
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }
}

impl fmt::Debug for RecordBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Pose {
        x: f64,
        y: f64,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Velocity(f64);

    #[test]
    fn distinct_types_get_distinct_ids() {
        assert_ne!(DataTypeId::of::<Pose>(), DataTypeId::of::<Velocity>());
        assert_eq!(DataTypeId::of::<Pose>(), DataTypeId::of::<Pose>());
    }

    #[test]
    fn record_box_roundtrips_through_downcast() {
        let boxed = RecordBox::new(Pose { x: 1.0, y: 2.0 });
        assert_eq!(boxed.downcast_ref::<Pose>(), Some(&Pose { x: 1.0, y: 2.0 }));
        assert_eq!(boxed.downcast_ref::<Velocity>(), None);
    }

    #[test]
    fn clone_is_cheap_arc_bump_not_deep_copy() {
        let boxed = RecordBox::new(Pose { x: 1.0, y: 2.0 });
        let cloned = boxed.clone();
        assert_eq!(boxed.data_type(), cloned.data_type());
        assert_eq!(cloned.downcast_ref::<Pose>(), Some(&Pose { x: 1.0, y: 2.0 }));
    }
}
