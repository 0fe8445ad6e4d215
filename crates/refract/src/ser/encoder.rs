// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Descriptor-driven binary encoder.
//!
//! Output goes through a bounded staging buffer that flushes to the sink
//! whenever it fills, so memory stays bounded regardless of graph size.
//! Shared-reference targets are assigned first-seen wire ids and queued for
//! their own top-level entries; a target is therefore expanded exactly once
//! per encode pass no matter how many fields point at it.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::io::Write;

use log::debug;

use crate::error::{Error, Result};
use crate::rtti::{
    FieldDescriptor, FieldKind, HookScope, InstanceId, InstancePool, PlainField, Reflectable,
    TypeRegistry,
};
use crate::stream::ByteStream;

use super::{FieldMeta, ObjectHeader, WireKind, BLOCK_LOCATOR_SIZE, MAX_WIRE_ID};

const DEFAULT_CHUNK: usize = 8 * 1024;
const MIN_CHUNK: usize = 64;

#[derive(Default, Clone, Copy)]
pub struct EncodeOptions<'a> {
    /// Write null in place of every shared reference instead of expanding
    /// targets; only the root object's own data is captured.
    pub shallow: bool,
    /// Opaque pass-through handed to traversal hooks.
    pub context: Option<&'a dyn Any>,
}

pub struct BinaryEncoder<'r> {
    registry: &'r TypeRegistry,
    staging: Vec<u8>,
    chunk: usize,
    written: u64,
    value_buf: Vec<u8>,
}

struct EncodeState {
    wire_ids: HashMap<u32, u32>,
    queue: VecDeque<InstanceId>,
    next_id: u32,
}

impl EncodeState {
    fn new() -> Self {
        Self {
            wire_ids: HashMap::new(),
            queue: VecDeque::new(),
            next_id: 1,
        }
    }

    /// First-seen ordinal for `id`, queueing the target on first sight.
    fn wire_id_for(&mut self, id: InstanceId) -> Result<u32> {
        if let Some(&wire) = self.wire_ids.get(&id.raw()) {
            return Ok(wire);
        }
        if self.next_id > MAX_WIRE_ID {
            return Err(Error::TooManyObjects);
        }
        let wire = self.next_id;
        self.next_id += 1;
        self.wire_ids.insert(id.raw(), wire);
        self.queue.push_back(id);
        Ok(wire)
    }
}

fn checked_u32(n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| Error::SizeLimit(n as u64))
}

impl<'r> BinaryEncoder<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self::with_chunk_size(registry, DEFAULT_CHUNK)
    }

    /// Encoder with a custom staging-buffer size.
    pub fn with_chunk_size(registry: &'r TypeRegistry, chunk: usize) -> Self {
        let chunk = chunk.max(MIN_CHUNK);
        Self {
            registry,
            staging: Vec::with_capacity(chunk),
            chunk,
            written: 0,
            value_buf: Vec::new(),
        }
    }

    /// Encodes the graph reachable from `root`, returning the byte count.
    pub fn encode(
        &mut self,
        pool: &InstancePool,
        root: InstanceId,
        sink: &mut dyn ByteStream,
        options: &EncodeOptions<'_>,
    ) -> Result<u64> {
        self.staging.clear();
        self.written = 0;

        let mut state = EncodeState::new();
        state.wire_id_for(root)?;
        while let Some(id) = state.queue.pop_front() {
            self.encode_entry(pool, &mut state, id, sink, options)?;
        }
        self.flush(sink)?;
        sink.flush()?;

        debug!(
            "encoded {} object(s), {} bytes",
            state.next_id - 1,
            self.written
        );
        Ok(self.written)
    }

    fn encode_entry(
        &mut self,
        pool: &InstancePool,
        state: &mut EncodeState,
        id: InstanceId,
        sink: &mut dyn ByteStream,
        options: &EncodeOptions<'_>,
    ) -> Result<()> {
        let wire_id = state
            .wire_ids
            .get(&id.raw())
            .copied()
            .ok_or(Error::UnknownInstance(id.raw()))?;
        let obj = pool.get(id).ok_or(Error::UnknownInstance(id.raw()))?;

        let registered = self.registry.lookup(obj.descriptor_id())?;
        let mut scope = HookScope::new(obj, options.context);
        for (level, desc) in registered.chain.iter().enumerate() {
            scope.enter(desc);
            let header = ObjectHeader {
                wire_id,
                base_level: level > 0,
            };
            self.put_u32(sink, header.pack())?;
            self.put_u32(sink, desc.id())?;
            for field in desc.fields() {
                self.encode_field(pool, state, obj, field, sink, options)?;
            }
        }
        Ok(())
    }

    /// Inline child object: levels with wire id 0, closed by a terminator.
    fn encode_child(
        &mut self,
        pool: &InstancePool,
        state: &mut EncodeState,
        child: &dyn Reflectable,
        sink: &mut dyn ByteStream,
        options: &EncodeOptions<'_>,
    ) -> Result<()> {
        let registered = self.registry.lookup(child.descriptor_id())?;
        {
            let mut scope = HookScope::new(child, options.context);
            for (level, desc) in registered.chain.iter().enumerate() {
                scope.enter(desc);
                let header = ObjectHeader {
                    wire_id: 0,
                    base_level: level > 0,
                };
                self.put_u32(sink, header.pack())?;
                self.put_u32(sink, desc.id())?;
                for field in desc.fields() {
                    self.encode_field(pool, state, child, field, sink, options)?;
                }
            }
        }
        self.put_u32(sink, FieldMeta::TERMINATOR.pack())
    }

    fn encode_field(
        &mut self,
        pool: &InstancePool,
        state: &mut EncodeState,
        obj: &dyn Reflectable,
        field: &FieldDescriptor,
        sink: &mut dyn ByteStream,
        options: &EncodeOptions<'_>,
    ) -> Result<()> {
        let array = field.is_array();
        match field.kind() {
            FieldKind::Plain(plain) => {
                let meta = FieldMeta {
                    id: field.id(),
                    fixed_size: plain.fixed_size.unwrap_or(0),
                    kind: WireKind::Plain,
                    array,
                    dynamic: plain.fixed_size.is_none(),
                    terminator: false,
                };
                self.put_u32(sink, meta.pack())?;
                if array {
                    let count = field.array_len(obj)?;
                    self.put_u32(sink, checked_u32(count)?)?;
                    for i in 0..count {
                        self.put_plain(sink, plain, obj, i)?;
                    }
                } else {
                    self.put_plain(sink, plain, obj, 0)?;
                }
            }
            FieldKind::Embedded(embedded) => {
                let meta = FieldMeta {
                    id: field.id(),
                    fixed_size: 0,
                    kind: WireKind::Embedded,
                    array,
                    dynamic: false,
                    terminator: false,
                };
                self.put_u32(sink, meta.pack())?;
                if array {
                    let count = field.array_len(obj)?;
                    self.put_u32(sink, checked_u32(count)?)?;
                    for i in 0..count {
                        let child = (embedded.get)(obj, i)?;
                        self.encode_child(pool, state, child, sink, options)?;
                    }
                } else {
                    let child = (embedded.get)(obj, 0)?;
                    self.encode_child(pool, state, child, sink, options)?;
                }
            }
            FieldKind::SharedRef(shared) => {
                let meta = FieldMeta {
                    id: field.id(),
                    fixed_size: 4,
                    kind: WireKind::SharedRef,
                    array,
                    dynamic: false,
                    terminator: false,
                };
                self.put_u32(sink, meta.pack())?;
                if array {
                    let count = field.array_len(obj)?;
                    self.put_u32(sink, checked_u32(count)?)?;
                    for i in 0..count {
                        let target = (shared.get)(obj, i)?;
                        let wire = self.ref_wire_id(state, target, options)?;
                        self.put_u32(sink, wire)?;
                    }
                } else {
                    let target = (shared.get)(obj, 0)?;
                    let wire = self.ref_wire_id(state, target, options)?;
                    self.put_u32(sink, wire)?;
                }
            }
            FieldKind::ExternalBlock(block) => {
                let meta = FieldMeta {
                    id: field.id(),
                    fixed_size: BLOCK_LOCATOR_SIZE,
                    kind: WireKind::Block,
                    array: false,
                    dynamic: false,
                    terminator: false,
                };
                self.put_u32(sink, meta.pack())?;
                let locator = (block.get)(obj)?;
                self.put_u64(sink, locator.offset)?;
                self.put_u32(sink, locator.size)?;
            }
        }
        Ok(())
    }

    fn ref_wire_id(
        &mut self,
        state: &mut EncodeState,
        target: Option<InstanceId>,
        options: &EncodeOptions<'_>,
    ) -> Result<u32> {
        match target {
            None => Ok(0),
            Some(_) if options.shallow => Ok(0),
            Some(id) => state.wire_id_for(id),
        }
    }

    fn put_plain(
        &mut self,
        sink: &mut dyn ByteStream,
        plain: &PlainField,
        obj: &dyn Reflectable,
        idx: usize,
    ) -> Result<()> {
        let mut buf = std::mem::take(&mut self.value_buf);
        buf.clear();
        let result = (plain.to_bytes)(obj, idx, &mut buf).and_then(|()| self.put(sink, &buf));
        self.value_buf = buf;
        result
    }

    fn put(&mut self, sink: &mut dyn ByteStream, bytes: &[u8]) -> Result<()> {
        self.written += bytes.len() as u64;
        if self.staging.len() + bytes.len() > self.chunk {
            self.flush(sink)?;
        }
        if bytes.len() >= self.chunk {
            // Oversized value: bypass staging entirely.
            sink.write_all(bytes)?;
        } else {
            self.staging.extend_from_slice(bytes);
        }
        Ok(())
    }

    fn put_u32(&mut self, sink: &mut dyn ByteStream, value: u32) -> Result<()> {
        self.put(sink, &value.to_le_bytes())
    }

    fn put_u64(&mut self, sink: &mut dyn ByteStream, value: u64) -> Result<()> {
        self.put(sink, &value.to_le_bytes())
    }

    fn flush(&mut self, sink: &mut dyn ByteStream) -> Result<()> {
        if !self.staging.is_empty() {
            sink.write_all(&self.staging)?;
            self.staging.clear();
        }
        Ok(())
    }
}
