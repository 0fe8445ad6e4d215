// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error type shared by the descriptor system, codec, tree model and
//! comparator.
//!
//! Three failure families exist: configuration errors (programmer mistakes
//! caught eagerly at registration), corrupt-data errors (malformed or
//! truncated input during decode) and capacity errors (a value or graph
//! exceeds the 32-bit wire limits). An equality mismatch is never an error;
//! the comparator reports it as a normal `false`.

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    // Configuration -------------------------------------------------------
    #[error("duplicate field id {id} on type `{type_name}`")]
    DuplicateFieldId { type_name: String, id: u16 },

    #[error("duplicate field name `{field}` on type `{type_name}`")]
    DuplicateFieldName { type_name: String, field: String },

    #[error("type id {0} is already registered")]
    DuplicateTypeId(u32),

    #[error("parent type id {parent} of `{type_name}` is not registered")]
    MissingParent { type_name: String, parent: u32 },

    #[error("field accessor expected a value of type `{type_name}`")]
    AccessorMismatch { type_name: &'static str },

    #[error("instance id {0} does not exist in the pool")]
    UnknownInstance(u32),

    // Corrupt data --------------------------------------------------------
    #[error("no type registered under id {0}")]
    UnknownType(u32),

    #[error("stream truncated while reading {what}")]
    Truncated { what: &'static str },

    #[error("length-prefixed value declares {declared} bytes but {actual} were available")]
    PrefixMismatch { declared: u32, actual: u32 },

    #[error("malformed object header {0:#010x}")]
    BadObjectHeader(u32),

    #[error("object id {0} appears twice in one stream")]
    DuplicateWireId(u32),

    #[error("field {field_id} of type {type_id} carries the wrong kind on the wire")]
    WireKindMismatch { type_id: u32, field_id: u16 },

    #[error("tree node for field {field_id} of type {type_id} has the wrong kind")]
    NodeKindMismatch { type_id: u32, field_id: u16 },

    #[error("length-prefixed value is not valid UTF-8")]
    InvalidUtf8,

    // Capacity ------------------------------------------------------------
    #[error("value of {0} bytes exceeds the 32-bit wire size limit")]
    SizeLimit(u64),

    #[error("object graph exceeds the wire object-id limit")]
    TooManyObjects,
}

impl Error {
    /// A programmer error in descriptor or registry setup.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::DuplicateFieldId { .. }
                | Error::DuplicateFieldName { .. }
                | Error::DuplicateTypeId(_)
                | Error::MissingParent { .. }
                | Error::AccessorMismatch { .. }
                | Error::UnknownInstance(_)
        )
    }

    /// Malformed input encountered while decoding.
    pub fn is_corrupt_data(&self) -> bool {
        matches!(
            self,
            Error::UnknownType(_)
                | Error::Truncated { .. }
                | Error::PrefixMismatch { .. }
                | Error::BadObjectHeader(_)
                | Error::DuplicateWireId(_)
                | Error::WireKindMismatch { .. }
                | Error::NodeKindMismatch { .. }
                | Error::InvalidUtf8
        )
    }

    /// A value or graph too large for the 32-bit wire format.
    pub fn is_capacity(&self) -> bool {
        matches!(self, Error::SizeLimit(_) | Error::TooManyObjects)
    }
}
