// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Descriptor-driven binary decoder.
//!
//! Two passes over a payload of known total length: pass one scans the
//! top-level object headers, allocating a blank instance per entry through
//! the registry factories and building the wire-id table; pass two decodes
//! field values into each instance. Because shared-reference fields store
//! instance ids, pass two needs no recursion across entries and cyclic
//! graphs decode in one flat loop.
//!
//! Unknown field ids are skipped by consuming exactly their declared size,
//! a deliberate forward-compatibility policy. Unknown *type* ids at an
//! object header are corrupt data.

use std::any::Any;
use std::collections::HashMap;
use std::io::{self, Read};
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, warn};

use crate::error::{Error, Result};
use crate::rtti::{
    ExternalBlock, FieldDescriptor, FieldKind, InstanceId, InstancePool, Reflectable, TypeDescriptor,
    TypeId, TypeRegistry,
};
use crate::stream::{ByteStream, StreamRef};

use super::{is_object_header, FieldMeta, ObjectHeader, WireKind, BLOCK_LOCATOR_SIZE};

#[derive(Default, Clone)]
pub struct DecodeOptions<'a> {
    /// Opaque pass-through handed to traversal hooks.
    pub context: Option<&'a dyn Any>,
    /// Stream to attach to decoded external-block locators.
    pub blocks: Option<StreamRef>,
}

pub struct BinaryDecoder<'r> {
    registry: &'r TypeRegistry,
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn pos(&self) -> usize {
        self.pos
    }

    fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    fn bytes(&mut self, n: usize, what: &'static str) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(Error::Truncated { what })?;
        if end > self.buf.len() {
            return Err(Error::Truncated { what });
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, n: usize, what: &'static str) -> Result<()> {
        self.bytes(n, what).map(|_| ())
    }

    fn u32(&mut self, what: &'static str) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.bytes(4, what)?))
    }

    fn u64(&mut self, what: &'static str) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.bytes(8, what)?))
    }

    fn peek_u32(&self, what: &'static str) -> Result<u32> {
        if self.pos + 4 > self.buf.len() {
            return Err(Error::Truncated { what });
        }
        Ok(LittleEndian::read_u32(&self.buf[self.pos..self.pos + 4]))
    }
}

enum LevelEnd {
    /// Stopped before an object header (not consumed).
    Header,
    /// Consumed an embedded-object terminator.
    Terminator,
    /// Ran out of payload.
    End,
}

fn skip_field_payload(r: &mut Reader<'_>, meta: FieldMeta) -> Result<()> {
    if meta.terminator {
        return Ok(());
    }
    match meta.kind {
        WireKind::Plain => {
            let count = if meta.array {
                r.u32("array count")?
            } else {
                1
            };
            for _ in 0..count {
                if meta.dynamic {
                    let total = r.peek_u32("dynamic value size")? as usize;
                    if total < 4 {
                        return Err(Error::Truncated {
                            what: "dynamic value size",
                        });
                    }
                    r.skip(total, "dynamic value")?;
                } else {
                    r.skip(meta.fixed_size as usize, "plain value")?;
                }
            }
        }
        WireKind::SharedRef => {
            let count = if meta.array {
                r.u32("array count")? as usize
            } else {
                1
            };
            r.skip(4 * count, "reference id")?;
        }
        WireKind::Block => {
            r.skip(BLOCK_LOCATOR_SIZE as usize, "block locator")?;
        }
        WireKind::Embedded => {
            let count = if meta.array {
                r.u32("array count")?
            } else {
                1
            };
            for _ in 0..count {
                skip_child(r)?;
            }
        }
    }
    Ok(())
}

/// Skips one embedded child: its level headers and fields up to and
/// including the terminator.
fn skip_child(r: &mut Reader<'_>) -> Result<()> {
    loop {
        let raw = r.u32("embedded object")?;
        if is_object_header(raw) {
            r.skip(4, "type id")?;
            continue;
        }
        let meta = FieldMeta::unpack(raw);
        if meta.terminator {
            return Ok(());
        }
        skip_field_payload(r, meta)?;
    }
}

/// Skips field records up to the next object header or end of payload.
fn skim_fields(r: &mut Reader<'_>) -> Result<()> {
    while !r.at_end() {
        let raw = r.peek_u32("field meta")?;
        if is_object_header(raw) {
            return Ok(());
        }
        r.skip(4, "field meta")?;
        let meta = FieldMeta::unpack(raw);
        skip_field_payload(r, meta)?;
    }
    Ok(())
}

/// Skips the body of a top-level entry whose first header and type id were
/// already consumed, stopping before the next top-level entry.
fn skim_entry_body(r: &mut Reader<'_>) -> Result<()> {
    loop {
        skim_fields(r)?;
        if r.at_end() {
            return Ok(());
        }
        let raw = r.peek_u32("object header")?;
        let header = ObjectHeader::unpack(raw)?;
        if !header.base_level {
            return Ok(());
        }
        r.skip(8, "base level header")?;
    }
}

impl<'r> BinaryDecoder<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self { registry }
    }

    /// Decodes `total_len` bytes from `source` into a fresh pool, returning
    /// it together with the root instance id.
    pub fn decode(
        &self,
        source: &mut dyn ByteStream,
        total_len: u32,
        options: &DecodeOptions<'_>,
    ) -> Result<(InstancePool, InstanceId)> {
        // Validate the declared length against the stream before trusting
        // it with an allocation.
        let available = source.size()?.saturating_sub(source.tell()?);
        if u64::from(total_len) > available {
            return Err(Error::Truncated {
                what: "encoded object payload",
            });
        }
        let mut data = vec![0u8; total_len as usize];
        source.read_exact(&mut data).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::Truncated {
                    what: "encoded object payload",
                }
            } else {
                Error::Io(e)
            }
        })?;

        let mut pool = InstancePool::new();
        let mut wire_map: HashMap<u32, InstanceId> = HashMap::new();
        let mut entries: Vec<(usize, InstanceId)> = Vec::new();

        // Pass 1: scan headers, allocate blanks, build the object table.
        let mut r = Reader::new(&data);
        while !r.at_end() {
            let offset = r.pos();
            let raw = r.u32("object header")?;
            let header = ObjectHeader::unpack(raw)?;
            if header.base_level || header.wire_id == 0 {
                return Err(Error::BadObjectHeader(raw));
            }
            let type_id = r.u32("type id")?;
            let instance = pool.insert(self.registry.create_instance(type_id)?);
            if wire_map.insert(header.wire_id, instance).is_some() {
                return Err(Error::DuplicateWireId(header.wire_id));
            }
            entries.push((offset, instance));
            skim_entry_body(&mut r)?;
        }

        let root = entries.first().map(|e| e.1).ok_or(Error::Truncated {
            what: "root object header",
        })?;
        debug!("decoding {} object(s) from {} bytes", entries.len(), total_len);

        // Pass 2: decode fields into every instance.
        for &(offset, instance) in &entries {
            let mut r = Reader::new(&data);
            r.seek(offset);
            self.decode_entry(&mut r, &mut pool, instance, &wire_map, options)?;
        }

        Ok((pool, root))
    }

    fn decode_entry(
        &self,
        r: &mut Reader<'_>,
        pool: &mut InstancePool,
        instance: InstanceId,
        wire_map: &HashMap<u32, InstanceId>,
        options: &DecodeOptions<'_>,
    ) -> Result<()> {
        let raw = r.u32("object header")?;
        ObjectHeader::unpack(raw)?;
        let type_id = r.u32("type id")?;

        let mut entered: Vec<Arc<TypeDescriptor>> = Vec::new();
        let result = {
            let obj = pool
                .get_mut(instance)
                .ok_or(Error::UnknownInstance(instance.raw()))?;
            self.decode_levels(r, obj, type_id, wire_map, options, &mut entered, false)
        };

        // Traversal-ended hooks fire on every exit path, errors included.
        if let Some(obj) = pool.get(instance) {
            for desc in entered.iter().rev() {
                desc.notify_ended(obj, options.context);
            }
        }
        result
    }

    fn decode_child(
        &self,
        r: &mut Reader<'_>,
        wire_map: &HashMap<u32, InstanceId>,
        options: &DecodeOptions<'_>,
    ) -> Result<Box<dyn Reflectable>> {
        let raw = r.u32("embedded object header")?;
        ObjectHeader::unpack(raw)?;
        let type_id = r.u32("type id")?;

        // The stored type id picks the factory, so a field declared with a
        // base type decodes the concrete type that was written.
        let mut obj = self.registry.create_instance(type_id)?;
        let mut entered: Vec<Arc<TypeDescriptor>> = Vec::new();
        let result =
            self.decode_levels(r, obj.as_mut(), type_id, wire_map, options, &mut entered, true);
        for desc in entered.iter().rev() {
            desc.notify_ended(obj.as_ref(), options.context);
        }
        result?;
        Ok(obj)
    }

    #[allow(clippy::too_many_arguments)]
    fn decode_levels(
        &self,
        r: &mut Reader<'_>,
        obj: &mut dyn Reflectable,
        first_type_id: TypeId,
        wire_map: &HashMap<u32, InstanceId>,
        options: &DecodeOptions<'_>,
        entered: &mut Vec<Arc<TypeDescriptor>>,
        child: bool,
    ) -> Result<()> {
        let mut type_id = first_type_id;
        loop {
            let desc = self.registry.get(type_id);
            match &desc {
                Some(d) => {
                    d.notify_started(&*obj, options.context);
                    entered.push(Arc::clone(d));
                }
                None => warn!("skipping fields of unknown type id {type_id}"),
            }

            let end = self.decode_fields(r, obj, desc.as_deref(), wire_map, options, child)?;
            match end {
                LevelEnd::Terminator => return Ok(()),
                LevelEnd::End => {
                    return if child {
                        Err(Error::Truncated {
                            what: "embedded object terminator",
                        })
                    } else {
                        Ok(())
                    };
                }
                LevelEnd::Header => {
                    let raw = r.peek_u32("object header")?;
                    let header = ObjectHeader::unpack(raw)?;
                    if !header.base_level {
                        if child {
                            return Err(Error::BadObjectHeader(raw));
                        }
                        return Ok(());
                    }
                    r.skip(4, "base level header")?;
                    type_id = r.u32("type id")?;
                }
            }
        }
    }

    fn decode_fields(
        &self,
        r: &mut Reader<'_>,
        obj: &mut dyn Reflectable,
        desc: Option<&TypeDescriptor>,
        wire_map: &HashMap<u32, InstanceId>,
        options: &DecodeOptions<'_>,
        child: bool,
    ) -> Result<LevelEnd> {
        loop {
            if r.at_end() {
                return Ok(LevelEnd::End);
            }
            let raw = r.peek_u32("field meta")?;
            if is_object_header(raw) {
                return Ok(LevelEnd::Header);
            }
            r.skip(4, "field meta")?;
            let meta = FieldMeta::unpack(raw);
            if meta.terminator {
                if child {
                    return Ok(LevelEnd::Terminator);
                }
                continue;
            }

            if let Some(d) = desc {
                if let Some(field) = d.find_field(meta.id) {
                    self.decode_field(r, obj, d.id(), field, meta, wire_map, options)?;
                    continue;
                }
                warn!(
                    "skipping unknown field id {} of type `{}`",
                    meta.id,
                    d.name()
                );
            }
            skip_field_payload(r, meta)?;
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn decode_field(
        &self,
        r: &mut Reader<'_>,
        obj: &mut dyn Reflectable,
        type_id: TypeId,
        field: &FieldDescriptor,
        meta: FieldMeta,
        wire_map: &HashMap<u32, InstanceId>,
        options: &DecodeOptions<'_>,
    ) -> Result<()> {
        let mismatch = || Error::WireKindMismatch {
            type_id,
            field_id: field.id(),
        };
        if meta.array != field.is_array() {
            return Err(mismatch());
        }

        match field.kind() {
            FieldKind::Plain(plain) => {
                if meta.kind != WireKind::Plain || meta.dynamic != plain.fixed_size.is_none() {
                    return Err(mismatch());
                }
                let count = if meta.array {
                    let count = r.u32("array count")? as usize;
                    field.set_array_len(obj, count)?;
                    count
                } else {
                    1
                };
                for i in 0..count {
                    let slice = if meta.dynamic {
                        let total = r.peek_u32("dynamic value size")? as usize;
                        if total < 4 {
                            return Err(Error::Truncated {
                                what: "dynamic value size",
                            });
                        }
                        r.bytes(total, "dynamic value")?
                    } else {
                        r.bytes(meta.fixed_size as usize, "plain value")?
                    };
                    (plain.from_bytes)(obj, i, slice)?;
                }
            }
            FieldKind::Embedded(embedded) => {
                if meta.kind != WireKind::Embedded {
                    return Err(mismatch());
                }
                let count = if meta.array {
                    let count = r.u32("array count")? as usize;
                    field.set_array_len(obj, count)?;
                    count
                } else {
                    1
                };
                for i in 0..count {
                    let value = self.decode_child(r, wire_map, options)?;
                    (embedded.set)(obj, i, value)?;
                }
            }
            FieldKind::SharedRef(shared) => {
                if meta.kind != WireKind::SharedRef {
                    return Err(mismatch());
                }
                let count = if meta.array {
                    let count = r.u32("array count")? as usize;
                    field.set_array_len(obj, count)?;
                    count
                } else {
                    1
                };
                for i in 0..count {
                    let wire = r.u32("reference id")?;
                    let target = if wire == 0 {
                        None
                    } else if let Some(&id) = wire_map.get(&wire) {
                        Some(id)
                    } else {
                        warn!("no object with wire id {wire} in this stream");
                        None
                    };
                    (shared.set)(obj, i, target)?;
                }
            }
            FieldKind::ExternalBlock(block) => {
                if meta.kind != WireKind::Block {
                    return Err(mismatch());
                }
                let offset = r.u64("block locator")?;
                let size = r.u32("block locator")?;
                (block.set)(
                    obj,
                    ExternalBlock {
                        stream: options.blocks.clone(),
                        offset,
                        size,
                    },
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impl_reflectable;
    use crate::rtti::{FieldDescriptor, TypeDescriptorBuilder};
    use crate::ser::{BinaryEncoder, EncodeOptions, META_FLAG_SHARED_REF};
    use crate::stream::MemoryStream;

    #[derive(Default)]
    struct Tag {
        count: u32,
        label: String,
    }

    impl_reflectable!(Tag, 950);

    fn registry_with_tag() -> TypeRegistry {
        let registry = TypeRegistry::new();
        registry
            .register(
                TypeDescriptorBuilder::new(950, "Tag", || Box::new(Tag::default()))
                    .field(FieldDescriptor::plain::<Tag, u32, _, _>(
                        0,
                        "count",
                        |t| &t.count,
                        |t, v| t.count = v,
                    ))
                    .field(FieldDescriptor::plain::<Tag, String, _, _>(
                        1,
                        "label",
                        |t| &t.label,
                        |t, v| t.label = v,
                    ))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
    }

    fn encoded_tag(registry: &TypeRegistry) -> Vec<u8> {
        let mut pool = InstancePool::new();
        let id = pool.insert(Box::new(Tag {
            count: 4,
            label: "hello".to_owned(),
        }));
        let mut stream = MemoryStream::new();
        BinaryEncoder::new(registry)
            .encode(&pool, id, &mut stream, &EncodeOptions::default())
            .unwrap();
        stream.into_inner()
    }

    fn decode_raw(
        registry: &TypeRegistry,
        bytes: &[u8],
        len: u32,
    ) -> Result<(InstancePool, InstanceId)> {
        let mut stream = MemoryStream::from_vec(bytes.to_vec());
        BinaryDecoder::new(registry).decode(&mut stream, len, &DecodeOptions::default())
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let registry = registry_with_tag();
        let bytes = encoded_tag(&registry);

        // Cut into the middle of the trailing string value.
        let cut = bytes.len() - 3;
        let err = decode_raw(&registry, &bytes[..cut], cut as u32).unwrap_err();
        assert!(matches!(err, Error::Truncated { .. }));
        assert!(err.is_corrupt_data());
    }

    #[test]
    fn oversized_length_fails_before_reading() {
        let registry = registry_with_tag();
        let bytes = encoded_tag(&registry);
        let err = decode_raw(&registry, &bytes, u32::MAX).unwrap_err();
        assert!(matches!(err, Error::Truncated { .. }));
    }

    #[test]
    fn flipped_kind_flag_is_a_wire_mismatch() {
        let registry = registry_with_tag();
        let mut bytes = encoded_tag(&registry);

        // Header and type id occupy the first 8 bytes; the flag byte of the
        // first field meta follows.
        bytes[8] |= META_FLAG_SHARED_REF as u8;
        let len = bytes.len() as u32;
        let err = decode_raw(&registry, &bytes, len).unwrap_err();
        assert!(matches!(
            err,
            Error::WireKindMismatch {
                type_id: 950,
                field_id: 0,
            }
        ));
        assert!(err.is_corrupt_data());
    }

    #[test]
    fn corrupted_dynamic_prefix_is_rejected() {
        let registry = registry_with_tag();
        let mut bytes = encoded_tag(&registry);

        // The string payload is the last 9 bytes; grow its size prefix past
        // the end of the record.
        let prefix_at = bytes.len() - 9;
        bytes[prefix_at] = 0xf0;
        let len = bytes.len() as u32;
        let err = decode_raw(&registry, &bytes, len).unwrap_err();
        assert!(matches!(err, Error::Truncated { .. }));
    }
}
