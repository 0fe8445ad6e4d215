// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Field descriptors and the closed set of field kinds.
//!
//! A field is `Plain` (marshaled bytes, fixed or length-prefixed),
//! `Embedded` (a nested reflectable value recursed inline), `SharedRef`
//! (an [`InstanceId`] into the owning pool, possibly shared or cyclic) or
//! `ExternalBlock` (an out-of-line payload referenced by locator). Kind
//! dispatch is a plain `match`; the typed constructors below erase concrete
//! getter/setter functions into uniform accessors the engine can drive
//! without knowing the concrete type.

use std::any;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::stream::StreamRef;

use super::plain::PlainValue;
use super::reflectable::{FieldId, InstanceId, Reflectable};

/// Locator for a large out-of-line payload in an external stream.
#[derive(Clone, Default)]
pub struct ExternalBlock {
    /// Stream the payload lives in; `None` when not attached.
    pub stream: Option<StreamRef>,
    pub offset: u64,
    pub size: u32,
}

impl fmt::Debug for ExternalBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalBlock")
            .field("stream", &self.stream.is_some())
            .field("offset", &self.offset)
            .field("size", &self.size)
            .finish()
    }
}

pub(crate) fn cast<T: Reflectable>(obj: &dyn Reflectable) -> Result<&T> {
    obj.as_any()
        .downcast_ref::<T>()
        .ok_or(Error::AccessorMismatch {
            type_name: any::type_name::<T>(),
        })
}

pub(crate) fn cast_mut<T: Reflectable>(obj: &mut dyn Reflectable) -> Result<&mut T> {
    obj.as_any_mut()
        .downcast_mut::<T>()
        .ok_or(Error::AccessorMismatch {
            type_name: any::type_name::<T>(),
        })
}

pub(crate) fn cast_box<T: Reflectable>(obj: Box<dyn Reflectable>) -> Result<Box<T>> {
    obj.into_any()
        .downcast::<T>()
        .map_err(|_| Error::AccessorMismatch {
            type_name: any::type_name::<T>(),
        })
}

pub(crate) type PlainToBytes =
    Box<dyn Fn(&dyn Reflectable, usize, &mut Vec<u8>) -> Result<()> + Send + Sync>;
pub(crate) type PlainFromBytes =
    Box<dyn Fn(&mut dyn Reflectable, usize, &[u8]) -> Result<()> + Send + Sync>;
pub(crate) type PlainSize = Box<dyn Fn(&dyn Reflectable, usize) -> Result<u32> + Send + Sync>;
pub(crate) type EmbeddedGet =
    Box<dyn for<'a> Fn(&'a dyn Reflectable, usize) -> Result<&'a dyn Reflectable> + Send + Sync>;
pub(crate) type EmbeddedSet =
    Box<dyn Fn(&mut dyn Reflectable, usize, Box<dyn Reflectable>) -> Result<()> + Send + Sync>;
pub(crate) type RefGet =
    Box<dyn Fn(&dyn Reflectable, usize) -> Result<Option<InstanceId>> + Send + Sync>;
pub(crate) type RefSet =
    Box<dyn Fn(&mut dyn Reflectable, usize, Option<InstanceId>) -> Result<()> + Send + Sync>;
pub(crate) type BlockGet = Box<dyn Fn(&dyn Reflectable) -> Result<ExternalBlock> + Send + Sync>;
pub(crate) type BlockSet =
    Box<dyn Fn(&mut dyn Reflectable, ExternalBlock) -> Result<()> + Send + Sync>;
pub(crate) type ArrayLen = Box<dyn Fn(&dyn Reflectable) -> Result<usize> + Send + Sync>;
pub(crate) type ArraySetLen = Box<dyn Fn(&mut dyn Reflectable, usize) -> Result<()> + Send + Sync>;

/// Length accessors shared by every array-flavored field.
pub(crate) struct ArrayOps {
    pub(crate) len: ArrayLen,
    pub(crate) set_len: ArraySetLen,
}

fn array_ops<T, L, SL>(len: L, set_len: SL) -> ArrayOps
where
    T: Reflectable,
    L: Fn(&T) -> usize + Send + Sync + 'static,
    SL: Fn(&mut T, usize) + Send + Sync + 'static,
{
    ArrayOps {
        len: Box::new(move |obj| Ok(len(cast::<T>(obj)?))),
        set_len: Box::new(move |obj, n| {
            set_len(cast_mut::<T>(obj)?, n);
            Ok(())
        }),
    }
}

pub struct PlainField {
    pub(crate) fixed_size: Option<u8>,
    pub(crate) array: Option<ArrayOps>,
    pub(crate) to_bytes: PlainToBytes,
    pub(crate) from_bytes: PlainFromBytes,
    pub(crate) dynamic_size: PlainSize,
}

pub struct EmbeddedField {
    pub(crate) array: Option<ArrayOps>,
    pub(crate) get: EmbeddedGet,
    pub(crate) set: EmbeddedSet,
}

pub struct SharedRefField {
    pub(crate) array: Option<ArrayOps>,
    pub(crate) get: RefGet,
    pub(crate) set: RefSet,
}

pub struct BlockField {
    pub(crate) get: BlockGet,
    pub(crate) set: BlockSet,
}

/// Closed tagged union of the four field kinds.
pub enum FieldKind {
    Plain(PlainField),
    Embedded(EmbeddedField),
    SharedRef(SharedRefField),
    ExternalBlock(BlockField),
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Plain(_) => "plain",
            FieldKind::Embedded(_) => "embedded",
            FieldKind::SharedRef(_) => "shared-ref",
            FieldKind::ExternalBlock(_) => "external-block",
        }
    }

    fn array(&self) -> Option<&ArrayOps> {
        match self {
            FieldKind::Plain(f) => f.array.as_ref(),
            FieldKind::Embedded(f) => f.array.as_ref(),
            FieldKind::SharedRef(f) => f.array.as_ref(),
            FieldKind::ExternalBlock(_) => None,
        }
    }
}

/// One field of a type descriptor.
pub struct FieldDescriptor {
    id: FieldId,
    name: String,
    kind: FieldKind,
}

impl FieldDescriptor {
    pub fn id(&self) -> FieldId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_array(&self) -> bool {
        self.kind.array().is_some()
    }

    pub(crate) fn array_len(&self, obj: &dyn Reflectable) -> Result<usize> {
        match self.kind.array() {
            Some(ops) => (ops.len)(obj),
            None => Ok(1),
        }
    }

    pub(crate) fn set_array_len(&self, obj: &mut dyn Reflectable, n: usize) -> Result<()> {
        match self.kind.array() {
            Some(ops) => (ops.set_len)(obj, n),
            None => Ok(()),
        }
    }

    /// Scalar plain field marshaled through `V`'s layout rule.
    pub fn plain<T, V, G, S>(id: FieldId, name: &str, get: G, set: S) -> Self
    where
        T: Reflectable,
        V: PlainValue,
        G: for<'a> Fn(&'a T) -> &'a V + Send + Sync + 'static,
        S: Fn(&mut T, V) + Send + Sync + 'static,
    {
        let get = Arc::new(get);
        let size_get = Arc::clone(&get);
        Self {
            id,
            name: name.to_owned(),
            kind: FieldKind::Plain(PlainField {
                fixed_size: V::FIXED_SIZE,
                array: None,
                to_bytes: Box::new(move |obj, _idx, out| get(cast::<T>(obj)?).write_bytes(out)),
                from_bytes: Box::new(move |obj, _idx, bytes| {
                    let value = V::read_bytes(bytes)?;
                    set(cast_mut::<T>(obj)?, value);
                    Ok(())
                }),
                dynamic_size: Box::new(move |obj, _idx| size_get(cast::<T>(obj)?).dynamic_size()),
            }),
        }
    }

    /// Array of plain values.
    pub fn plain_array<T, V, L, SL, G, S>(
        id: FieldId,
        name: &str,
        len: L,
        set_len: SL,
        get: G,
        set: S,
    ) -> Self
    where
        T: Reflectable,
        V: PlainValue,
        L: Fn(&T) -> usize + Send + Sync + 'static,
        SL: Fn(&mut T, usize) + Send + Sync + 'static,
        G: for<'a> Fn(&'a T, usize) -> &'a V + Send + Sync + 'static,
        S: Fn(&mut T, usize, V) + Send + Sync + 'static,
    {
        let get = Arc::new(get);
        let size_get = Arc::clone(&get);
        Self {
            id,
            name: name.to_owned(),
            kind: FieldKind::Plain(PlainField {
                fixed_size: V::FIXED_SIZE,
                array: Some(array_ops(len, set_len)),
                to_bytes: Box::new(move |obj, idx, out| get(cast::<T>(obj)?, idx).write_bytes(out)),
                from_bytes: Box::new(move |obj, idx, bytes| {
                    let value = V::read_bytes(bytes)?;
                    set(cast_mut::<T>(obj)?, idx, value);
                    Ok(())
                }),
                dynamic_size: Box::new(move |obj, idx| {
                    size_get(cast::<T>(obj)?, idx).dynamic_size()
                }),
            }),
        }
    }

    /// Nested reflectable value recursed inline.
    pub fn embedded<T, C, G, S>(id: FieldId, name: &str, get: G, set: S) -> Self
    where
        T: Reflectable,
        C: Reflectable,
        G: for<'a> Fn(&'a T) -> &'a C + Send + Sync + 'static,
        S: Fn(&mut T, C) + Send + Sync + 'static,
    {
        Self {
            id,
            name: name.to_owned(),
            kind: FieldKind::Embedded(EmbeddedField {
                array: None,
                get: Box::new(move |obj, _idx| Ok(get(cast::<T>(obj)?) as &dyn Reflectable)),
                set: Box::new(move |obj, _idx, child| {
                    let child = cast_box::<C>(child)?;
                    set(cast_mut::<T>(obj)?, *child);
                    Ok(())
                }),
            }),
        }
    }

    /// Array of nested reflectable values.
    pub fn embedded_array<T, C, L, SL, G, S>(
        id: FieldId,
        name: &str,
        len: L,
        set_len: SL,
        get: G,
        set: S,
    ) -> Self
    where
        T: Reflectable,
        C: Reflectable,
        L: Fn(&T) -> usize + Send + Sync + 'static,
        SL: Fn(&mut T, usize) + Send + Sync + 'static,
        G: for<'a> Fn(&'a T, usize) -> &'a C + Send + Sync + 'static,
        S: Fn(&mut T, usize, C) + Send + Sync + 'static,
    {
        Self {
            id,
            name: name.to_owned(),
            kind: FieldKind::Embedded(EmbeddedField {
                array: Some(array_ops(len, set_len)),
                get: Box::new(move |obj, idx| Ok(get(cast::<T>(obj)?, idx) as &dyn Reflectable)),
                set: Box::new(move |obj, idx, child| {
                    let child = cast_box::<C>(child)?;
                    set(cast_mut::<T>(obj)?, idx, *child);
                    Ok(())
                }),
            }),
        }
    }

    /// Embedded field with type-erased accessors, for polymorphic slots.
    pub(crate) fn embedded_dyn(id: FieldId, name: &str, get: EmbeddedGet, set: EmbeddedSet) -> Self {
        Self {
            id,
            name: name.to_owned(),
            kind: FieldKind::Embedded(EmbeddedField {
                array: None,
                get,
                set,
            }),
        }
    }

    /// Embedded array with type-erased accessors.
    pub(crate) fn embedded_array_dyn(
        id: FieldId,
        name: &str,
        array: ArrayOps,
        get: EmbeddedGet,
        set: EmbeddedSet,
    ) -> Self {
        Self {
            id,
            name: name.to_owned(),
            kind: FieldKind::Embedded(EmbeddedField {
                array: Some(array),
                get,
                set,
            }),
        }
    }

    /// Reference to a pool instance; shared targets and cycles are allowed.
    pub fn shared_ref<T, G, S>(id: FieldId, name: &str, get: G, set: S) -> Self
    where
        T: Reflectable,
        G: Fn(&T) -> Option<InstanceId> + Send + Sync + 'static,
        S: Fn(&mut T, Option<InstanceId>) + Send + Sync + 'static,
    {
        Self {
            id,
            name: name.to_owned(),
            kind: FieldKind::SharedRef(SharedRefField {
                array: None,
                get: Box::new(move |obj, _idx| Ok(get(cast::<T>(obj)?))),
                set: Box::new(move |obj, _idx, target| {
                    set(cast_mut::<T>(obj)?, target);
                    Ok(())
                }),
            }),
        }
    }

    /// Array of pool references.
    pub fn shared_ref_array<T, L, SL, G, S>(
        id: FieldId,
        name: &str,
        len: L,
        set_len: SL,
        get: G,
        set: S,
    ) -> Self
    where
        T: Reflectable,
        L: Fn(&T) -> usize + Send + Sync + 'static,
        SL: Fn(&mut T, usize) + Send + Sync + 'static,
        G: Fn(&T, usize) -> Option<InstanceId> + Send + Sync + 'static,
        S: Fn(&mut T, usize, Option<InstanceId>) + Send + Sync + 'static,
    {
        Self {
            id,
            name: name.to_owned(),
            kind: FieldKind::SharedRef(SharedRefField {
                array: Some(array_ops(len, set_len)),
                get: Box::new(move |obj, idx| Ok(get(cast::<T>(obj)?, idx))),
                set: Box::new(move |obj, idx, target| {
                    set(cast_mut::<T>(obj)?, idx, target);
                    Ok(())
                }),
            }),
        }
    }

    /// Out-of-line payload referenced by `(stream, offset, size)` locator.
    /// Only the locator travels with the object; the bytes stay external.
    pub fn external_block<T, G, S>(id: FieldId, name: &str, get: G, set: S) -> Self
    where
        T: Reflectable,
        G: Fn(&T) -> ExternalBlock + Send + Sync + 'static,
        S: Fn(&mut T, ExternalBlock) + Send + Sync + 'static,
    {
        Self {
            id,
            name: name.to_owned(),
            kind: FieldKind::ExternalBlock(BlockField {
                get: Box::new(move |obj| Ok(get(cast::<T>(obj)?))),
                set: Box::new(move |obj, block| {
                    set(cast_mut::<T>(obj)?, block);
                    Ok(())
                }),
            }),
        }
    }
}
