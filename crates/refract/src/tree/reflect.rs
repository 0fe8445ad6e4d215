// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Descriptors for the serialized-tree types themselves.
//!
//! A [`SerializedObject`](super::SerializedObject) is reflectable like any
//! user type, so trees round-trip through the binary engine. The entry maps
//! serialize as embedded arrays: a traversal-started hook stages the sorted
//! keys behind the node's mutex, the array getter walks that order, and the
//! ended hook clears it. Node slots are polymorphic; the stored type id of a
//! child picks the concrete node on decode.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::impl_reflectable;
use crate::rtti::{
    cast, cast_box, cast_mut, ArrayOps, EmbeddedGet, EmbeddedSet, FieldDescriptor, FieldId,
    Reflectable, TypeDescriptor, TypeDescriptorBuilder, TypeId, TypeRegistry,
};

use super::{
    SerializedArray, SerializedArrayEntry, SerializedEntry, SerializedExternalBlock,
    SerializedField, SerializedNode, SerializedObject, SerializedRef, SerializedSubObject,
};

pub const TID_SERIALIZED_OBJECT: TypeId = 1;
pub const TID_SERIALIZED_SUB_OBJECT: TypeId = 2;
pub const TID_SERIALIZED_ENTRY: TypeId = 3;
pub const TID_SERIALIZED_FIELD: TypeId = 4;
pub const TID_SERIALIZED_BLOCK: TypeId = 5;
pub const TID_SERIALIZED_ARRAY: TypeId = 6;
pub const TID_SERIALIZED_ARRAY_ENTRY: TypeId = 7;
pub const TID_SERIALIZED_REF: TypeId = 8;

impl_reflectable!(SerializedObject, TID_SERIALIZED_OBJECT);
impl_reflectable!(SerializedSubObject, TID_SERIALIZED_SUB_OBJECT);
impl_reflectable!(SerializedEntry, TID_SERIALIZED_ENTRY);
impl_reflectable!(SerializedField, TID_SERIALIZED_FIELD);
impl_reflectable!(SerializedExternalBlock, TID_SERIALIZED_BLOCK);
impl_reflectable!(SerializedArray, TID_SERIALIZED_ARRAY);
impl_reflectable!(SerializedArrayEntry, TID_SERIALIZED_ARRAY_ENTRY);
impl_reflectable!(SerializedRef, TID_SERIALIZED_REF);

fn object_factory() -> Box<dyn Reflectable> {
    Box::new(SerializedObject::default())
}

fn sub_object_factory() -> Box<dyn Reflectable> {
    Box::new(SerializedSubObject::default())
}

fn entry_factory() -> Box<dyn Reflectable> {
    Box::new(SerializedEntry::default())
}

fn field_factory() -> Box<dyn Reflectable> {
    Box::new(SerializedField::default())
}

fn block_factory() -> Box<dyn Reflectable> {
    Box::new(SerializedExternalBlock::default())
}

fn array_factory() -> Box<dyn Reflectable> {
    Box::new(SerializedArray::default())
}

fn array_entry_factory() -> Box<dyn Reflectable> {
    Box::new(SerializedArrayEntry::default())
}

fn ref_factory() -> Box<dyn Reflectable> {
    Box::new(SerializedRef::default())
}

fn node_as_dyn(node: &SerializedNode) -> &dyn Reflectable {
    match node {
        SerializedNode::Field(f) => f,
        SerializedNode::Block(b) => b,
        SerializedNode::Object(o) => &**o,
        SerializedNode::Array(a) => a,
        SerializedNode::Ref(r) => r,
    }
}

fn node_from_boxed(boxed: Box<dyn Reflectable>) -> Result<SerializedNode> {
    let any = boxed.into_any();
    let any = match any.downcast::<SerializedField>() {
        Ok(f) => return Ok(SerializedNode::Field(*f)),
        Err(any) => any,
    };
    let any = match any.downcast::<SerializedExternalBlock>() {
        Ok(b) => return Ok(SerializedNode::Block(*b)),
        Err(any) => any,
    };
    let any = match any.downcast::<SerializedObject>() {
        Ok(o) => return Ok(SerializedNode::Object(o)),
        Err(any) => any,
    };
    let any = match any.downcast::<SerializedArray>() {
        Ok(a) => return Ok(SerializedNode::Array(*a)),
        Err(any) => any,
    };
    match any.downcast::<SerializedRef>() {
        Ok(r) => Ok(SerializedNode::Ref(*r)),
        Err(_) => Err(Error::AccessorMismatch {
            type_name: "SerializedNode",
        }),
    }
}

fn embedded_get(
    get: impl for<'a> Fn(&'a dyn Reflectable, usize) -> Result<&'a dyn Reflectable>
        + Send
        + Sync
        + 'static,
) -> EmbeddedGet {
    Box::new(get)
}

fn embedded_set(
    set: impl Fn(&mut dyn Reflectable, usize, Box<dyn Reflectable>) -> Result<()>
        + Send
        + Sync
        + 'static,
) -> EmbeddedSet {
    Box::new(set)
}

const STAGED_ORDER: Error = Error::Truncated {
    what: "staged entry order",
};

fn object_descriptor() -> Result<TypeDescriptor> {
    TypeDescriptorBuilder::new(TID_SERIALIZED_OBJECT, "SerializedObject", object_factory)
        .field(FieldDescriptor::embedded_array::<
            SerializedObject,
            SerializedSubObject,
            _,
            _,
            _,
            _,
        >(
            0,
            "sub_objects",
            |o| o.sub_objects.len(),
            |o, n| o.sub_objects.resize_with(n, Default::default),
            |o, i| &o.sub_objects[i],
            |o, i, v| o.sub_objects[i] = v,
        ))
        .field(FieldDescriptor::embedded_array::<
            SerializedObject,
            SerializedObject,
            _,
            _,
            _,
            _,
        >(
            1,
            "references",
            |o| o.references.len(),
            |o, n| o.references.resize_with(n, Default::default),
            |o, i| &o.references[i],
            |o, i, v| o.references[i] = v,
        ))
        .build()
}

fn sub_object_descriptor() -> Result<TypeDescriptor> {
    let entries = FieldDescriptor::embedded_array_dyn(
        1,
        "entries",
        ArrayOps {
            len: Box::new(|obj| Ok(cast::<SerializedSubObject>(obj)?.entries.len())),
            set_len: Box::new(|obj, _n| {
                cast_mut::<SerializedSubObject>(obj)?;
                Ok(())
            }),
        },
        embedded_get(|obj, idx| {
            let sub = cast::<SerializedSubObject>(obj)?;
            let key = sub.staged.lock().get(idx).copied().ok_or(STAGED_ORDER)?;
            sub.entries
                .get(&key)
                .map(|e| e as &dyn Reflectable)
                .ok_or(STAGED_ORDER)
        }),
        embedded_set(|obj, _idx, child| {
            let entry = cast_box::<SerializedEntry>(child)?;
            let sub = cast_mut::<SerializedSubObject>(obj)?;
            sub.entries.insert(entry.field_id, *entry);
            Ok(())
        }),
    );
    TypeDescriptorBuilder::new(
        TID_SERIALIZED_SUB_OBJECT,
        "SerializedSubObject",
        sub_object_factory,
    )
    .field(FieldDescriptor::plain::<SerializedSubObject, u32, _, _>(
        0,
        "type_id",
        |s| &s.type_id,
        |s, v| s.type_id = v,
    ))
    .field(entries)
    .on_traversal_started(Arc::new(|obj, _ctx| {
        if let Some(sub) = obj.as_any().downcast_ref::<SerializedSubObject>() {
            let mut keys: Vec<FieldId> = sub.entries.keys().copied().collect();
            keys.sort_unstable();
            *sub.staged.lock() = keys;
        }
    }))
    .on_traversal_ended(Arc::new(|obj, _ctx| {
        if let Some(sub) = obj.as_any().downcast_ref::<SerializedSubObject>() {
            sub.staged.lock().clear();
        }
    }))
    .build()
}

fn entry_descriptor() -> Result<TypeDescriptor> {
    let node = FieldDescriptor::embedded_dyn(
        1,
        "node",
        embedded_get(|obj, _idx| Ok(node_as_dyn(&cast::<SerializedEntry>(obj)?.node))),
        embedded_set(|obj, _idx, child| {
            cast_mut::<SerializedEntry>(obj)?.node = node_from_boxed(child)?;
            Ok(())
        }),
    );
    TypeDescriptorBuilder::new(TID_SERIALIZED_ENTRY, "SerializedEntry", entry_factory)
        .field(FieldDescriptor::plain::<SerializedEntry, u16, _, _>(
            0,
            "field_id",
            |e| &e.field_id,
            |e, v| e.field_id = v,
        ))
        .field(node)
        .build()
}

fn field_descriptor() -> Result<TypeDescriptor> {
    TypeDescriptorBuilder::new(TID_SERIALIZED_FIELD, "SerializedField", field_factory)
        .field(FieldDescriptor::plain::<SerializedField, Vec<u8>, _, _>(
            0,
            "bytes",
            |f| f.bytes.as_ref(),
            |f, v| f.bytes = Arc::new(v),
        ))
        .build()
}

fn block_descriptor() -> Result<TypeDescriptor> {
    // The stream handle is a process-local resource; only the locator
    // numbers serialize. A decoded block comes back detached.
    TypeDescriptorBuilder::new(TID_SERIALIZED_BLOCK, "SerializedExternalBlock", block_factory)
        .field(FieldDescriptor::plain::<SerializedExternalBlock, u64, _, _>(
            0,
            "offset",
            |b| &b.offset,
            |b, v| b.offset = v,
        ))
        .field(FieldDescriptor::plain::<SerializedExternalBlock, u32, _, _>(
            1,
            "size",
            |b| &b.size,
            |b, v| b.size = v,
        ))
        .build()
}

fn array_descriptor() -> Result<TypeDescriptor> {
    let entries = FieldDescriptor::embedded_array_dyn(
        1,
        "entries",
        ArrayOps {
            len: Box::new(|obj| Ok(cast::<SerializedArray>(obj)?.entries.len())),
            set_len: Box::new(|obj, _n| {
                cast_mut::<SerializedArray>(obj)?;
                Ok(())
            }),
        },
        embedded_get(|obj, idx| {
            let array = cast::<SerializedArray>(obj)?;
            let key = array.staged.lock().get(idx).copied().ok_or(STAGED_ORDER)?;
            array
                .entries
                .get(&key)
                .map(|e| e as &dyn Reflectable)
                .ok_or(STAGED_ORDER)
        }),
        embedded_set(|obj, _idx, child| {
            let entry = cast_box::<SerializedArrayEntry>(child)?;
            let array = cast_mut::<SerializedArray>(obj)?;
            array.entries.insert(entry.index, *entry);
            Ok(())
        }),
    );
    TypeDescriptorBuilder::new(TID_SERIALIZED_ARRAY, "SerializedArray", array_factory)
        .field(FieldDescriptor::plain::<SerializedArray, u32, _, _>(
            0,
            "num_elements",
            |a| &a.num_elements,
            |a, v| a.num_elements = v,
        ))
        .field(entries)
        .on_traversal_started(Arc::new(|obj, _ctx| {
            if let Some(array) = obj.as_any().downcast_ref::<SerializedArray>() {
                let mut keys: Vec<u32> = array.entries.keys().copied().collect();
                keys.sort_unstable();
                *array.staged.lock() = keys;
            }
        }))
        .on_traversal_ended(Arc::new(|obj, _ctx| {
            if let Some(array) = obj.as_any().downcast_ref::<SerializedArray>() {
                array.staged.lock().clear();
            }
        }))
        .build()
}

fn array_entry_descriptor() -> Result<TypeDescriptor> {
    let node = FieldDescriptor::embedded_dyn(
        1,
        "node",
        embedded_get(|obj, _idx| Ok(node_as_dyn(&cast::<SerializedArrayEntry>(obj)?.node))),
        embedded_set(|obj, _idx, child| {
            cast_mut::<SerializedArrayEntry>(obj)?.node = node_from_boxed(child)?;
            Ok(())
        }),
    );
    TypeDescriptorBuilder::new(
        TID_SERIALIZED_ARRAY_ENTRY,
        "SerializedArrayEntry",
        array_entry_factory,
    )
    .field(FieldDescriptor::plain::<SerializedArrayEntry, u32, _, _>(
        0,
        "index",
        |e| &e.index,
        |e, v| e.index = v,
    ))
    .field(node)
    .build()
}

fn ref_descriptor() -> Result<TypeDescriptor> {
    TypeDescriptorBuilder::new(TID_SERIALIZED_REF, "SerializedRef", ref_factory)
        .field(FieldDescriptor::plain::<SerializedRef, u32, _, _>(
            0,
            "ordinal",
            |r| &r.ordinal,
            |r, v| r.ordinal = v,
        ))
        .build()
}

/// Installs the serialized-tree descriptors into a registry.
pub(crate) fn register_builtins(registry: &TypeRegistry) -> Result<()> {
    registry.register(object_descriptor()?)?;
    registry.register(sub_object_descriptor()?)?;
    registry.register(entry_descriptor()?)?;
    registry.register(field_descriptor()?)?;
    registry.register(block_descriptor()?)?;
    registry.register(array_descriptor()?)?;
    registry.register(array_entry_descriptor()?)?;
    registry.register(ref_descriptor()?)?;
    Ok(())
}
