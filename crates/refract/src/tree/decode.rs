// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Rebuilds live objects from a serialized tree.
//!
//! Two phases, mirroring the binary decoder: first a blank instance per
//! ordinal (root plus every entry of the target table), then field
//! application. Reference nodes resolve through the ordinal map, so cyclic
//! graphs need no recursion across pool entries.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use log::warn;

use crate::error::{Error, Result};
use crate::rtti::{
    ExternalBlock, FieldDescriptor, FieldKind, InstanceId, InstancePool, Reflectable,
    TypeDescriptor, TypeId, TypeRegistry,
};

use super::{SerializedNode, SerializedObject};

impl SerializedObject {
    /// Instantiates the graph this tree describes, returning the pool and
    /// the root's id.
    pub fn decode(
        &self,
        registry: &TypeRegistry,
        context: Option<&dyn Any>,
    ) -> Result<(InstancePool, InstanceId)> {
        let mut pool = InstancePool::new();
        let mut ordinals: HashMap<u32, InstanceId> = HashMap::new();

        let root_id = pool.insert(registry.create_instance(self.tree_type_id()?)?);
        ordinals.insert(1, root_id);
        for (i, body) in self.references.iter().enumerate() {
            let id = pool.insert(registry.create_instance(body.tree_type_id()?)?);
            ordinals.insert(i as u32 + 2, id);
        }

        let decoder = TreeDecoder {
            registry,
            context,
            ordinals: &ordinals,
        };
        decoder.apply_entry(&mut pool, root_id, self)?;
        for (i, body) in self.references.iter().enumerate() {
            let id = ordinals[&(i as u32 + 2)];
            decoder.apply_entry(&mut pool, id, body)?;
        }
        Ok((pool, root_id))
    }

    fn tree_type_id(&self) -> Result<TypeId> {
        self.root_type_id().ok_or(Error::Truncated {
            what: "serialized tree levels",
        })
    }
}

struct TreeDecoder<'a> {
    registry: &'a TypeRegistry,
    context: Option<&'a dyn Any>,
    ordinals: &'a HashMap<u32, InstanceId>,
}

impl TreeDecoder<'_> {
    fn apply_entry(&self, pool: &mut InstancePool, id: InstanceId, tree: &SerializedObject) -> Result<()> {
        let mut entered: Vec<Arc<TypeDescriptor>> = Vec::new();
        let result = match pool.get_mut(id) {
            Some(obj) => self.apply_body(obj, tree, &mut entered),
            None => Err(Error::UnknownInstance(id.raw())),
        };
        // Ended hooks fire on error paths too, in reverse order.
        if let Some(obj) = pool.get(id) {
            for desc in entered.iter().rev() {
                desc.notify_ended(obj, self.context);
            }
        }
        result
    }

    fn apply_body(
        &self,
        obj: &mut dyn Reflectable,
        tree: &SerializedObject,
        entered: &mut Vec<Arc<TypeDescriptor>>,
    ) -> Result<()> {
        for sub in &tree.sub_objects {
            let Some(desc) = self.registry.get(sub.type_id) else {
                warn!("skipping unregistered level {}", sub.type_id);
                continue;
            };
            desc.notify_started(&*obj, self.context);
            entered.push(Arc::clone(&desc));
            for entry in sub.entries.values() {
                let Some(field) = desc.find_field(entry.field_id) else {
                    warn!(
                        "skipping unknown field {} of type {}",
                        entry.field_id,
                        desc.name()
                    );
                    continue;
                };
                self.apply_field(obj, sub.type_id, field, &entry.node)?;
            }
        }
        Ok(())
    }

    fn apply_field(
        &self,
        obj: &mut dyn Reflectable,
        type_id: TypeId,
        field: &FieldDescriptor,
        node: &SerializedNode,
    ) -> Result<()> {
        let mismatch = || Error::NodeKindMismatch {
            type_id,
            field_id: field.id(),
        };
        match (field.kind(), node) {
            (FieldKind::Plain(plain), SerializedNode::Field(leaf)) if !field.is_array() => {
                (plain.from_bytes)(obj, 0, &leaf.bytes)
            }
            (FieldKind::Plain(plain), SerializedNode::Array(array)) if field.is_array() => {
                field.set_array_len(obj, array.num_elements as usize)?;
                for entry in array.entries.values() {
                    if entry.index >= array.num_elements {
                        return Err(mismatch());
                    }
                    let SerializedNode::Field(leaf) = &entry.node else {
                        return Err(mismatch());
                    };
                    (plain.from_bytes)(obj, entry.index as usize, &leaf.bytes)?;
                }
                Ok(())
            }
            (FieldKind::Embedded(embedded), SerializedNode::Object(body)) if !field.is_array() => {
                let child = self.instantiate(body)?;
                (embedded.set)(obj, 0, child)
            }
            (FieldKind::Embedded(embedded), SerializedNode::Array(array)) if field.is_array() => {
                field.set_array_len(obj, array.num_elements as usize)?;
                for entry in array.entries.values() {
                    if entry.index >= array.num_elements {
                        return Err(mismatch());
                    }
                    let SerializedNode::Object(body) = &entry.node else {
                        return Err(mismatch());
                    };
                    let child = self.instantiate(body)?;
                    (embedded.set)(obj, entry.index as usize, child)?;
                }
                Ok(())
            }
            (FieldKind::SharedRef(shared), SerializedNode::Ref(reference)) if !field.is_array() => {
                (shared.set)(obj, 0, self.resolve(reference.ordinal))
            }
            (FieldKind::SharedRef(shared), SerializedNode::Array(array)) if field.is_array() => {
                field.set_array_len(obj, array.num_elements as usize)?;
                for entry in array.entries.values() {
                    if entry.index >= array.num_elements {
                        return Err(mismatch());
                    }
                    let SerializedNode::Ref(reference) = &entry.node else {
                        return Err(mismatch());
                    };
                    (shared.set)(obj, entry.index as usize, self.resolve(reference.ordinal))?;
                }
                Ok(())
            }
            (FieldKind::ExternalBlock(block), SerializedNode::Block(locator)) => {
                (block.set)(
                    obj,
                    ExternalBlock {
                        stream: locator.stream.clone(),
                        offset: locator.offset,
                        size: locator.size,
                    },
                )
            }
            _ => Err(mismatch()),
        }
    }

    /// Builds an embedded child, levels most-derived first; the stored type
    /// id picks the factory, so polymorphic slots rebuild their concrete
    /// type.
    fn instantiate(&self, tree: &SerializedObject) -> Result<Box<dyn Reflectable>> {
        let mut obj = self.registry.create_instance(tree.tree_type_id()?)?;
        let mut entered: Vec<Arc<TypeDescriptor>> = Vec::new();
        let result = self.apply_body(obj.as_mut(), tree, &mut entered);
        for desc in entered.iter().rev() {
            desc.notify_ended(obj.as_ref(), self.context);
        }
        result?;
        Ok(obj)
    }

    fn resolve(&self, ordinal: u32) -> Option<InstanceId> {
        if ordinal == 0 {
            return None;
        }
        let resolved = self.ordinals.get(&ordinal).copied();
        if resolved.is_none() {
            // Shallow trees record ordinals without targets.
            warn!("unresolved reference ordinal {ordinal}, storing null");
        }
        resolved
    }
}
