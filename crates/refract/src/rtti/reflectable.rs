// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The reflection capability and instance ownership model.
//!
//! Every value participating in serialization implements [`Reflectable`],
//! tying it to a registered type descriptor by stable numeric id. Objects
//! that can be shared or form cycles live in an [`InstancePool`] and are
//! addressed by [`InstanceId`]; reference fields store ids, never pointers,
//! so visited-tracking during traversal is a plain set of integers.

use std::any::Any;
use std::num::NonZeroU32;

/// Stable numeric id of a registered type descriptor.
///
/// Ids 1..=99 are reserved for built-in types; applications start at 100.
pub type TypeId = u32;

/// Per-type-level field id; unique only among the fields one descriptor
/// declares directly.
pub type FieldId = u16;

/// A value that exposes a registered type descriptor for generic traversal.
pub trait Reflectable: Any {
    /// Id of this value's type descriptor.
    fn descriptor_id(&self) -> TypeId;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl std::fmt::Debug for dyn Reflectable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reflectable")
            .field("descriptor_id", &self.descriptor_id())
            .finish_non_exhaustive()
    }
}

/// Implements [`Reflectable`] for a concrete type with a fixed descriptor id.
#[macro_export]
macro_rules! impl_reflectable {
    ($ty:ty, $id:expr) => {
        impl $crate::rtti::Reflectable for $ty {
            fn descriptor_id(&self) -> $crate::rtti::TypeId {
                $id
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }

            fn into_any(self: ::std::boxed::Box<Self>) -> ::std::boxed::Box<dyn ::std::any::Any> {
                self
            }
        }
    };
}

/// Stable handle to an object stored in an [`InstancePool`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct InstanceId(NonZeroU32);

impl InstanceId {
    pub fn raw(self) -> u32 {
        self.0.get()
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    fn index(self) -> usize {
        self.0.get() as usize - 1
    }
}

/// Arena of reflectable instances addressed by stable integer ids.
///
/// Shared-reference fields hold `Option<InstanceId>` into one pool; the pool
/// owns every object of a graph, so cyclic graphs need no reference
/// counting.
#[derive(Default)]
pub struct InstancePool {
    slots: Vec<Box<dyn Reflectable>>,
}

impl std::fmt::Debug for InstancePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstancePool")
            .field("len", &self.slots.len())
            .finish_non_exhaustive()
    }
}

impl InstancePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an object, returning its id. Ids are dense, starting at 1.
    pub fn insert(&mut self, object: Box<dyn Reflectable>) -> InstanceId {
        self.slots.push(object);
        // len is at least 1 here
        InstanceId(NonZeroU32::new(self.slots.len() as u32).unwrap_or(NonZeroU32::MIN))
    }

    pub fn get(&self, id: InstanceId) -> Option<&dyn Reflectable> {
        self.slots.get(id.index()).map(AsRef::as_ref)
    }

    pub fn get_mut(&mut self, id: InstanceId) -> Option<&mut dyn Reflectable> {
        self.slots.get_mut(id.index()).map(AsMut::as_mut)
    }

    /// Typed view of a stored object.
    pub fn get_as<T: Reflectable>(&self, id: InstanceId) -> Option<&T> {
        self.get(id).and_then(|obj| obj.as_any().downcast_ref())
    }

    pub fn get_as_mut<T: Reflectable>(&mut self, id: InstanceId) -> Option<&mut T> {
        self.get_mut(id).and_then(|obj| obj.as_any_mut().downcast_mut())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = InstanceId> + '_ {
        (1..=self.slots.len() as u32).filter_map(InstanceId::from_raw)
    }
}
