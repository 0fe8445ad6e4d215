// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Binary encode/decode engine.
//!
//! Wire layout (all integers little-endian). A stream of total known length
//! holds one or more top-level object entries; entry 1 is the root, later
//! entries are shared-reference targets in first-seen order.
//!
//! ```text
//! object entry   := level+ (levels most-derived first)
//! level          := object header (u32) | type id (u32) | field record*
//! object header  := wire_id << 2 | is_base_level << 1 | 1
//! field record   := field meta (u32) | payload
//! field meta     := field_id << 16 | fixed_size << 8 | flags   (bit 0 clear)
//! payload        := plain bytes | count + elements | child + terminator
//!                 | target wire id (u32) | block locator (u64 + u32)
//! ```
//!
//! Dynamic plain payloads start with a u32 holding their total size, prefix
//! included. Embedded children repeat the level structure inline with
//! `wire_id = 0` and close with a terminator field meta. Wire id 0 in a
//! shared-reference payload is a null reference.

mod decoder;
mod encoder;

pub use decoder::{BinaryDecoder, DecodeOptions};
pub use encoder::{BinaryEncoder, EncodeOptions};

use crate::error::{Error, Result};
use crate::rtti::FieldId;

pub(crate) const META_FLAG_OBJECT: u32 = 0x01;
pub(crate) const META_FLAG_ARRAY: u32 = 0x02;
pub(crate) const META_FLAG_BLOCK: u32 = 0x04;
pub(crate) const META_FLAG_EMBEDDED: u32 = 0x08;
pub(crate) const META_FLAG_SHARED_REF: u32 = 0x10;
pub(crate) const META_FLAG_DYNAMIC: u32 = 0x20;
pub(crate) const META_FLAG_TERMINATOR: u32 = 0x40;

/// Wire object ids occupy 30 bits of the object header.
pub(crate) const MAX_WIRE_ID: u32 = (1 << 30) - 1;

/// Size of a block locator payload: u64 offset + u32 size.
pub(crate) const BLOCK_LOCATOR_SIZE: u8 = 12;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WireKind {
    Plain,
    Embedded,
    SharedRef,
    Block,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct FieldMeta {
    pub(crate) id: FieldId,
    pub(crate) fixed_size: u8,
    pub(crate) kind: WireKind,
    pub(crate) array: bool,
    pub(crate) dynamic: bool,
    pub(crate) terminator: bool,
}

impl FieldMeta {
    pub(crate) const TERMINATOR: FieldMeta = FieldMeta {
        id: 0,
        fixed_size: 0,
        kind: WireKind::Plain,
        array: false,
        dynamic: false,
        terminator: true,
    };

    pub(crate) fn pack(self) -> u32 {
        let mut flags = match self.kind {
            WireKind::Plain => 0,
            WireKind::Embedded => META_FLAG_EMBEDDED,
            WireKind::SharedRef => META_FLAG_SHARED_REF,
            WireKind::Block => META_FLAG_BLOCK,
        };
        if self.array {
            flags |= META_FLAG_ARRAY;
        }
        if self.dynamic {
            flags |= META_FLAG_DYNAMIC;
        }
        if self.terminator {
            flags |= META_FLAG_TERMINATOR;
        }
        u32::from(self.id) << 16 | u32::from(self.fixed_size) << 8 | flags
    }

    /// Interprets a raw meta word. The caller has already ruled out object
    /// headers via [`is_object_header`].
    pub(crate) fn unpack(raw: u32) -> FieldMeta {
        let kind = if raw & META_FLAG_SHARED_REF != 0 {
            WireKind::SharedRef
        } else if raw & META_FLAG_EMBEDDED != 0 {
            WireKind::Embedded
        } else if raw & META_FLAG_BLOCK != 0 {
            WireKind::Block
        } else {
            WireKind::Plain
        };
        FieldMeta {
            id: (raw >> 16) as u16,
            fixed_size: (raw >> 8) as u8,
            kind,
            array: raw & META_FLAG_ARRAY != 0,
            dynamic: raw & META_FLAG_DYNAMIC != 0,
            terminator: raw & META_FLAG_TERMINATOR != 0,
        }
    }
}

pub(crate) fn is_object_header(raw: u32) -> bool {
    raw & META_FLAG_OBJECT != 0
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ObjectHeader {
    pub(crate) wire_id: u32,
    pub(crate) base_level: bool,
}

impl ObjectHeader {
    pub(crate) fn pack(self) -> u32 {
        self.wire_id << 2 | u32::from(self.base_level) << 1 | META_FLAG_OBJECT
    }

    pub(crate) fn unpack(raw: u32) -> Result<ObjectHeader> {
        if raw & META_FLAG_OBJECT == 0 {
            return Err(Error::BadObjectHeader(raw));
        }
        Ok(ObjectHeader {
            wire_id: raw >> 2,
            base_level: raw & 0x02 != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_meta_round_trip() {
        let meta = FieldMeta {
            id: 0x1234,
            fixed_size: 8,
            kind: WireKind::Plain,
            array: true,
            dynamic: false,
            terminator: false,
        };
        let raw = meta.pack();
        assert!(!is_object_header(raw));
        let back = FieldMeta::unpack(raw);
        assert_eq!(back.id, 0x1234);
        assert_eq!(back.fixed_size, 8);
        assert_eq!(back.kind, WireKind::Plain);
        assert!(back.array);
        assert!(!back.dynamic);
    }

    #[test]
    fn kind_flags_are_distinct() {
        for (kind, flag) in [
            (WireKind::Embedded, META_FLAG_EMBEDDED),
            (WireKind::SharedRef, META_FLAG_SHARED_REF),
            (WireKind::Block, META_FLAG_BLOCK),
        ] {
            let raw = FieldMeta {
                id: 1,
                fixed_size: 0,
                kind,
                array: false,
                dynamic: true,
                terminator: false,
            }
            .pack();
            assert_eq!(raw & flag, flag);
            assert_eq!(FieldMeta::unpack(raw).kind, kind);
        }
    }

    #[test]
    fn terminator_meta() {
        let raw = FieldMeta::TERMINATOR.pack();
        assert!(FieldMeta::unpack(raw).terminator);
        assert!(!is_object_header(raw));
    }

    #[test]
    fn object_header_round_trip() {
        let header = ObjectHeader {
            wire_id: MAX_WIRE_ID,
            base_level: true,
        };
        let raw = header.pack();
        assert!(is_object_header(raw));
        assert_eq!(ObjectHeader::unpack(raw).unwrap(), header);
    }

    #[test]
    fn field_meta_is_rejected_as_object_header() {
        let raw = FieldMeta::TERMINATOR.pack();
        assert!(matches!(
            ObjectHeader::unpack(raw).unwrap_err(),
            Error::BadObjectHeader(_)
        ));
    }
}
