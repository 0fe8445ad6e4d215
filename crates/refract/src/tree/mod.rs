// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type-erased intermediate model of a serialized object.
//!
//! A [`SerializedObject`] mirrors the descriptor walk: one
//! [`SerializedSubObject`] per inheritance level, each mapping field ids to
//! nodes. Shared-reference fields store ordinals ([`SerializedRef`]) into a
//! target table kept on the root of a `create` pass, so shared and cyclic
//! graphs flatten without back edges. The model is usable without the
//! original classes: it can be cloned, diffed and decoded back, and is
//! itself reflectable (see [`reflect`]), so a tree round-trips through the
//! binary engine like any other graph.

mod decode;
pub(crate) mod reflect;

pub use reflect::{
    TID_SERIALIZED_ARRAY, TID_SERIALIZED_ARRAY_ENTRY, TID_SERIALIZED_BLOCK, TID_SERIALIZED_ENTRY,
    TID_SERIALIZED_FIELD, TID_SERIALIZED_OBJECT, TID_SERIALIZED_REF, TID_SERIALIZED_SUB_OBJECT,
};

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::rtti::{
    FieldDescriptor, FieldId, FieldKind, HookScope, InstanceId, InstancePool, Reflectable, TypeId,
    TypeRegistry,
};
use crate::stream::{share, MemoryStream, StreamRef};

use crate::ser::MAX_WIRE_ID;

/// Serialized form of one object (all its inheritance levels), plus — on
/// the root of a `create` pass — the table of shared-reference targets.
///
/// Ordinal 1 refers to the root object itself; ordinal `n >= 2` indexes
/// `references[n - 2]`; ordinal 0 is a null reference.
#[derive(Clone, Debug, Default)]
pub struct SerializedObject {
    pub sub_objects: Vec<SerializedSubObject>,
    pub references: Vec<SerializedObject>,
}

/// Field entries declared at one inheritance level.
#[derive(Debug, Default)]
pub struct SerializedSubObject {
    pub type_id: TypeId,
    pub entries: HashMap<FieldId, SerializedEntry>,
    /// Deterministic key order staged by the traversal-started hook while
    /// this node is itself being serialized.
    pub(crate) staged: Mutex<Vec<FieldId>>,
}

impl SerializedSubObject {
    pub fn new(type_id: TypeId) -> Self {
        Self {
            type_id,
            entries: HashMap::new(),
            staged: Mutex::new(Vec::new()),
        }
    }
}

impl Clone for SerializedSubObject {
    fn clone(&self) -> Self {
        Self {
            type_id: self.type_id,
            entries: self.entries.clone(),
            staged: Mutex::new(Vec::new()),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SerializedEntry {
    pub field_id: FieldId,
    pub node: SerializedNode,
}

/// One serialized value.
#[derive(Clone, Debug)]
pub enum SerializedNode {
    Field(SerializedField),
    Block(SerializedExternalBlock),
    Object(Box<SerializedObject>),
    Array(SerializedArray),
    Ref(SerializedRef),
}

impl Default for SerializedNode {
    fn default() -> Self {
        SerializedNode::Field(SerializedField::default())
    }
}

/// Marshaled bytes of one plain value. The buffer is reference counted so
/// non-data clones can share it.
#[derive(Clone, Debug, Default)]
pub struct SerializedField {
    pub bytes: Arc<Vec<u8>>,
}

impl SerializedField {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(bytes),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Locator of an out-of-line payload; the bytes themselves stay in the
/// referenced stream.
#[derive(Clone, Default)]
pub struct SerializedExternalBlock {
    pub stream: Option<StreamRef>,
    pub offset: u64,
    pub size: u32,
}

impl fmt::Debug for SerializedExternalBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializedExternalBlock")
            .field("stream", &self.stream.is_some())
            .field("offset", &self.offset)
            .field("size", &self.size)
            .finish()
    }
}

impl SerializedExternalBlock {
    fn deep_clone(&self, clone_data: bool) -> Result<Self> {
        let stream = match &self.stream {
            Some(stream) if clone_data => stream,
            _ => return Ok(self.clone()),
        };
        let mut buf = vec![0u8; self.size as usize];
        {
            let mut guard = stream.lock();
            guard.seek(SeekFrom::Start(self.offset))?;
            guard.read_exact(&mut buf)?;
        }
        Ok(Self {
            stream: Some(share(MemoryStream::from_vec(buf))),
            offset: 0,
            size: self.size,
        })
    }
}

/// Serialized array: index → entry map plus the element count. Entries may
/// be sparse; absent indices keep their decoded default.
#[derive(Debug, Default)]
pub struct SerializedArray {
    pub entries: HashMap<u32, SerializedArrayEntry>,
    pub num_elements: u32,
    pub(crate) staged: Mutex<Vec<u32>>,
}

impl SerializedArray {
    pub fn new(num_elements: u32) -> Self {
        Self {
            entries: HashMap::new(),
            num_elements,
            staged: Mutex::new(Vec::new()),
        }
    }
}

impl Clone for SerializedArray {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            num_elements: self.num_elements,
            staged: Mutex::new(Vec::new()),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SerializedArrayEntry {
    pub index: u32,
    pub node: SerializedNode,
}

/// Shared-reference ordinal; 0 is null.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SerializedRef {
    pub ordinal: u32,
}

impl SerializedNode {
    fn deep_clone(&self, clone_data: bool) -> Result<Self> {
        Ok(match self {
            SerializedNode::Field(f) => SerializedNode::Field(if clone_data {
                SerializedField::new(f.bytes.as_ref().clone())
            } else {
                f.clone()
            }),
            SerializedNode::Block(b) => SerializedNode::Block(b.deep_clone(clone_data)?),
            SerializedNode::Object(o) => SerializedNode::Object(Box::new(o.deep_clone(clone_data)?)),
            SerializedNode::Array(a) => {
                let mut out = SerializedArray::new(a.num_elements);
                for (idx, entry) in &a.entries {
                    out.entries.insert(
                        *idx,
                        SerializedArrayEntry {
                            index: entry.index,
                            node: entry.node.deep_clone(clone_data)?,
                        },
                    );
                }
                SerializedNode::Array(out)
            }
            SerializedNode::Ref(r) => SerializedNode::Ref(*r),
        })
    }
}

impl SerializedObject {
    /// Type id of the most-derived level.
    pub fn root_type_id(&self) -> Option<TypeId> {
        self.sub_objects.first().map(|s| s.type_id)
    }

    /// Materializes the tree form of the graph reachable from `root`.
    ///
    /// With `shallow`, expansion stops at shared-reference boundaries: the
    /// ordinals are still recorded (capturing which fields referenced what)
    /// but the target table stays empty.
    pub fn create(
        registry: &TypeRegistry,
        pool: &InstancePool,
        root: InstanceId,
        shallow: bool,
        context: Option<&dyn Any>,
    ) -> Result<SerializedObject> {
        let mut builder = TreeBuilder {
            registry,
            pool,
            shallow,
            context,
            ordinals: HashMap::new(),
            queue: VecDeque::new(),
            next: 2,
        };
        builder.ordinals.insert(root.raw(), 1);

        let root_obj = pool.get(root).ok_or(Error::UnknownInstance(root.raw()))?;
        let mut tree = builder.build_body(root_obj)?;
        while let Some(id) = builder.queue.pop_front() {
            let obj = pool.get(id).ok_or(Error::UnknownInstance(id.raw()))?;
            let body = builder.build_body(obj)?;
            tree.references.push(body);
        }
        Ok(tree)
    }

    /// Deep-copies the tree structure. Leaf payloads (field bytes, block
    /// streams) are copied only when `clone_data` is set; otherwise the
    /// clone shares them with the original via reference counting.
    pub fn deep_clone(&self, clone_data: bool) -> Result<SerializedObject> {
        let mut sub_objects = Vec::with_capacity(self.sub_objects.len());
        for sub in &self.sub_objects {
            let mut out = SerializedSubObject::new(sub.type_id);
            for (id, entry) in &sub.entries {
                out.entries.insert(
                    *id,
                    SerializedEntry {
                        field_id: entry.field_id,
                        node: entry.node.deep_clone(clone_data)?,
                    },
                );
            }
            sub_objects.push(out);
        }
        let mut references = Vec::with_capacity(self.references.len());
        for body in &self.references {
            references.push(body.deep_clone(clone_data)?);
        }
        Ok(SerializedObject {
            sub_objects,
            references,
        })
    }
}

/// Clones the live graph reachable from `root` into a fresh pool by going
/// through the tree form. With `shallow`, only the root object itself is
/// duplicated and its shared-reference fields come back null.
pub fn clone_instance(
    registry: &TypeRegistry,
    pool: &InstancePool,
    root: InstanceId,
    shallow: bool,
) -> Result<(InstancePool, InstanceId)> {
    SerializedObject::create(registry, pool, root, shallow, None)?.decode(registry, None)
}

struct TreeBuilder<'a> {
    registry: &'a TypeRegistry,
    pool: &'a InstancePool,
    shallow: bool,
    context: Option<&'a dyn Any>,
    ordinals: HashMap<u32, u32>,
    queue: VecDeque<InstanceId>,
    next: u32,
}

impl TreeBuilder<'_> {
    fn ordinal_for(&mut self, id: InstanceId) -> Result<u32> {
        if let Some(&ordinal) = self.ordinals.get(&id.raw()) {
            return Ok(ordinal);
        }
        if self.next > MAX_WIRE_ID {
            return Err(Error::TooManyObjects);
        }
        let ordinal = self.next;
        self.next += 1;
        self.ordinals.insert(id.raw(), ordinal);
        if !self.shallow {
            self.queue.push_back(id);
        }
        Ok(ordinal)
    }

    /// Serializes one object's levels, without its target table.
    fn build_body(&mut self, obj: &dyn Reflectable) -> Result<SerializedObject> {
        let registered = self.registry.lookup(obj.descriptor_id())?;
        let mut tree = SerializedObject::default();
        let mut scope = HookScope::new(obj, self.context);
        for desc in &registered.chain {
            scope.enter(desc);
            let mut sub = SerializedSubObject::new(desc.id());
            for field in desc.fields() {
                let node = self.build_field(obj, field)?;
                sub.entries.insert(
                    field.id(),
                    SerializedEntry {
                        field_id: field.id(),
                        node,
                    },
                );
            }
            tree.sub_objects.push(sub);
        }
        Ok(tree)
    }

    fn build_field(&mut self, obj: &dyn Reflectable, field: &FieldDescriptor) -> Result<SerializedNode> {
        match field.kind() {
            FieldKind::Plain(plain) => {
                if field.is_array() {
                    let count = field.array_len(obj)?;
                    let mut array = SerializedArray::new(checked_count(count)?);
                    for i in 0..count {
                        let mut bytes = Vec::new();
                        (plain.to_bytes)(obj, i, &mut bytes)?;
                        array.entries.insert(
                            i as u32,
                            SerializedArrayEntry {
                                index: i as u32,
                                node: SerializedNode::Field(SerializedField::new(bytes)),
                            },
                        );
                    }
                    Ok(SerializedNode::Array(array))
                } else {
                    let mut bytes = Vec::new();
                    (plain.to_bytes)(obj, 0, &mut bytes)?;
                    Ok(SerializedNode::Field(SerializedField::new(bytes)))
                }
            }
            FieldKind::Embedded(embedded) => {
                if field.is_array() {
                    let count = field.array_len(obj)?;
                    let mut array = SerializedArray::new(checked_count(count)?);
                    for i in 0..count {
                        let child = (embedded.get)(obj, i)?;
                        let body = self.build_body(child)?;
                        array.entries.insert(
                            i as u32,
                            SerializedArrayEntry {
                                index: i as u32,
                                node: SerializedNode::Object(Box::new(body)),
                            },
                        );
                    }
                    Ok(SerializedNode::Array(array))
                } else {
                    let child = (embedded.get)(obj, 0)?;
                    Ok(SerializedNode::Object(Box::new(self.build_body(child)?)))
                }
            }
            FieldKind::SharedRef(shared) => {
                if field.is_array() {
                    let count = field.array_len(obj)?;
                    let mut array = SerializedArray::new(checked_count(count)?);
                    for i in 0..count {
                        let ordinal = self.ref_ordinal((shared.get)(obj, i)?)?;
                        array.entries.insert(
                            i as u32,
                            SerializedArrayEntry {
                                index: i as u32,
                                node: SerializedNode::Ref(SerializedRef { ordinal }),
                            },
                        );
                    }
                    Ok(SerializedNode::Array(array))
                } else {
                    let ordinal = self.ref_ordinal((shared.get)(obj, 0)?)?;
                    Ok(SerializedNode::Ref(SerializedRef { ordinal }))
                }
            }
            FieldKind::ExternalBlock(block) => {
                let locator = (block.get)(obj)?;
                Ok(SerializedNode::Block(SerializedExternalBlock {
                    stream: locator.stream,
                    offset: locator.offset,
                    size: locator.size,
                }))
            }
        }
    }

    fn ref_ordinal(&mut self, target: Option<InstanceId>) -> Result<u32> {
        match target {
            None => Ok(0),
            Some(id) => self.ordinal_for(id),
        }
    }
}

fn checked_count(count: usize) -> Result<u32> {
    u32::try_from(count).map_err(|_| Error::SizeLimit(count as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_without_data_shares_leaf_buffers() {
        let mut sub = SerializedSubObject::new(7);
        sub.entries.insert(
            0,
            SerializedEntry {
                field_id: 0,
                node: SerializedNode::Field(SerializedField::new(vec![1, 2, 3])),
            },
        );
        let tree = SerializedObject {
            sub_objects: vec![sub],
            references: Vec::new(),
        };

        let shared = tree.deep_clone(false).unwrap();
        let copied = tree.deep_clone(true).unwrap();

        let original = &tree.sub_objects[0].entries[&0].node;
        let shared_node = &shared.sub_objects[0].entries[&0].node;
        let copied_node = &copied.sub_objects[0].entries[&0].node;
        let (SerializedNode::Field(a), SerializedNode::Field(b), SerializedNode::Field(c)) =
            (original, shared_node, copied_node)
        else {
            panic!("expected field nodes");
        };
        assert!(Arc::ptr_eq(&a.bytes, &b.bytes));
        assert!(!Arc::ptr_eq(&a.bytes, &c.bytes));
        assert_eq!(*c.bytes, vec![1, 2, 3]);
    }

    #[test]
    fn clone_with_data_copies_block_streams() {
        let stream = share(MemoryStream::from_vec(vec![9, 8, 7, 6]));
        let block = SerializedExternalBlock {
            stream: Some(stream.clone()),
            offset: 1,
            size: 2,
        };

        let shared = block.deep_clone(false).unwrap();
        assert!(Arc::ptr_eq(
            shared.stream.as_ref().unwrap(),
            &stream
        ));
        assert_eq!(shared.offset, 1);

        let copied = block.deep_clone(true).unwrap();
        let copy_stream = copied.stream.unwrap();
        assert_eq!(copied.offset, 0);
        assert_eq!(copied.size, 2);
        let mut buf = [0u8; 2];
        {
            let mut guard = copy_stream.lock();
            guard.seek(SeekFrom::Start(0)).unwrap();
            guard.read_exact(&mut buf).unwrap();
        }
        assert_eq!(buf, [8, 7]);
    }

    #[test]
    fn detached_block_clones_without_a_stream() {
        let block = SerializedExternalBlock {
            stream: None,
            offset: 5,
            size: 10,
        };
        let copied = block.deep_clone(true).unwrap();
        assert!(copied.stream.is_none());
        assert_eq!(copied.offset, 5);
    }
}
