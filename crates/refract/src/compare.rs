// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Descriptor-driven deep equality.
//!
//! Two graphs compare equal when their objects have identical type ids and
//! every field matches: plain values by marshaled bytes, embedded values
//! recursively, shared references by target equality, blocks by their
//! external payloads. Visited tracking over `(id, id)` pairs makes cyclic
//! graphs terminate; a pair already under comparison is presumed equal and
//! any real difference surfaces through some other field of the cycle.

use std::collections::HashSet;
use std::io::{Read, Seek, SeekFrom};

use crate::arena::FrameArena;
use crate::error::{Error, Result};
use crate::rtti::{
    ExternalBlock, FieldDescriptor, FieldKind, HookScope, InstanceId, InstancePool, PlainField,
    Reflectable, TypeRegistry,
};

/// Custom equality for one registered type, honored in place of the
/// field-by-field walk. Both sides are guaranteed to share the override's
/// descriptor id.
pub trait CompareOverride: Send + Sync {
    fn equals(&self, a: &dyn Reflectable, b: &dyn Reflectable) -> bool;
}

/// Reusable deep-equality comparator.
///
/// Scratch allocations for marshaled bytes are frame-scoped and reused
/// across runs, so repeated comparisons settle into zero heap traffic.
pub struct BinaryCompare<'r> {
    registry: &'r TypeRegistry,
    arena: FrameArena,
    visited: HashSet<(u32, u32)>,
}

impl<'r> BinaryCompare<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self::with_arena(registry, FrameArena::new())
    }

    /// Comparator backed by a caller-supplied arena, for sharing scratch
    /// capacity across comparators.
    pub fn with_arena(registry: &'r TypeRegistry, arena: FrameArena) -> Self {
        Self {
            registry,
            arena,
            visited: HashSet::new(),
        }
    }

    /// Deep equality of the graphs rooted at `a` and `b`.
    pub fn run(
        &mut self,
        pool_a: &InstancePool,
        a: InstanceId,
        pool_b: &InstancePool,
        b: InstanceId,
    ) -> Result<bool> {
        self.visited.clear();
        self.arena.mark_frame();
        let result = self.compare_ids(pool_a, Some(a), pool_b, Some(b));
        self.arena.clear();
        self.visited.clear();
        result
    }

    fn compare_ids(
        &mut self,
        pool_a: &InstancePool,
        a: Option<InstanceId>,
        pool_b: &InstancePool,
        b: Option<InstanceId>,
    ) -> Result<bool> {
        match (a, b) {
            (None, None) => Ok(true),
            (Some(a), Some(b)) => {
                if !self.visited.insert((a.raw(), b.raw())) {
                    return Ok(true);
                }
                let obj_a = pool_a.get(a).ok_or(Error::UnknownInstance(a.raw()))?;
                let obj_b = pool_b.get(b).ok_or(Error::UnknownInstance(b.raw()))?;
                self.compare_objects(pool_a, obj_a, pool_b, obj_b)
            }
            _ => Ok(false),
        }
    }

    /// Field-by-field equality of two objects, hierarchy levels included.
    pub fn compare_objects(
        &mut self,
        pool_a: &InstancePool,
        a: &dyn Reflectable,
        pool_b: &InstancePool,
        b: &dyn Reflectable,
    ) -> Result<bool> {
        if a.descriptor_id() != b.descriptor_id() {
            return Ok(false);
        }
        let registered = self.registry.lookup(a.descriptor_id())?;
        if let Some(handler) = registered.desc.compare_override() {
            return Ok(handler.equals(a, b));
        }

        let mut scope_a = HookScope::new(a, None);
        let mut scope_b = HookScope::new(b, None);
        for desc in &registered.chain {
            scope_a.enter(desc);
            scope_b.enter(desc);
            for field in desc.fields() {
                if !self.compare_field(pool_a, a, pool_b, b, field)? {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    fn compare_field(
        &mut self,
        pool_a: &InstancePool,
        a: &dyn Reflectable,
        pool_b: &InstancePool,
        b: &dyn Reflectable,
        field: &FieldDescriptor,
    ) -> Result<bool> {
        match field.kind() {
            FieldKind::Plain(plain) => {
                if field.is_array() {
                    let count = field.array_len(a)?;
                    if count != field.array_len(b)? {
                        return Ok(false);
                    }
                    for i in 0..count {
                        if !self.compare_plain(plain, a, b, i)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                } else {
                    self.compare_plain(plain, a, b, 0)
                }
            }
            FieldKind::Embedded(embedded) => {
                if field.is_array() {
                    let count = field.array_len(a)?;
                    if count != field.array_len(b)? {
                        return Ok(false);
                    }
                    for i in 0..count {
                        let child_a = (embedded.get)(a, i)?;
                        let child_b = (embedded.get)(b, i)?;
                        if !self.compare_objects(pool_a, child_a, pool_b, child_b)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                } else {
                    let child_a = (embedded.get)(a, 0)?;
                    let child_b = (embedded.get)(b, 0)?;
                    self.compare_objects(pool_a, child_a, pool_b, child_b)
                }
            }
            FieldKind::SharedRef(shared) => {
                if field.is_array() {
                    let count = field.array_len(a)?;
                    if count != field.array_len(b)? {
                        return Ok(false);
                    }
                    for i in 0..count {
                        let target_a = (shared.get)(a, i)?;
                        let target_b = (shared.get)(b, i)?;
                        if !self.compare_ids(pool_a, target_a, pool_b, target_b)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                } else {
                    let target_a = (shared.get)(a, 0)?;
                    let target_b = (shared.get)(b, 0)?;
                    self.compare_ids(pool_a, target_a, pool_b, target_b)
                }
            }
            FieldKind::ExternalBlock(block) => {
                self.compare_blocks((block.get)(a)?, (block.get)(b)?)
            }
        }
    }

    /// Marshaled-byte equality; the size check short-circuits dynamic
    /// values of different lengths without marshaling either side.
    fn compare_plain(
        &mut self,
        plain: &PlainField,
        a: &dyn Reflectable,
        b: &dyn Reflectable,
        idx: usize,
    ) -> Result<bool> {
        if (plain.dynamic_size)(a, idx)? != (plain.dynamic_size)(b, idx)? {
            return Ok(false);
        }
        let (buf_a, buf_b) = self.arena.scratch_pair();
        (plain.to_bytes)(a, idx, buf_a)?;
        (plain.to_bytes)(b, idx, buf_b)?;
        Ok(buf_a == buf_b)
    }

    fn compare_blocks(&mut self, a: ExternalBlock, b: ExternalBlock) -> Result<bool> {
        if a.size != b.size {
            return Ok(false);
        }
        match (&a.stream, &b.stream) {
            (None, None) => Ok(true),
            (Some(stream_a), Some(stream_b)) => {
                let (buf_a, buf_b) = self.arena.scratch_pair();
                buf_a.resize(a.size as usize, 0);
                buf_b.resize(b.size as usize, 0);
                {
                    let mut guard = stream_a.lock();
                    guard.seek(SeekFrom::Start(a.offset))?;
                    guard.read_exact(buf_a)?;
                }
                {
                    let mut guard = stream_b.lock();
                    guard.seek(SeekFrom::Start(b.offset))?;
                    guard.read_exact(buf_b)?;
                }
                Ok(buf_a == buf_b)
            }
            _ => Ok(false),
        }
    }
}
