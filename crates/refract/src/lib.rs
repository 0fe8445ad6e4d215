// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reflection-driven binary serialization.
//!
//! Types describe themselves through registered [`rtti::TypeDescriptor`]s:
//! stable numeric ids, ordered fields with type-erased accessors, optional
//! parent levels forming an inheritance chain. Everything else is generic
//! code walking those descriptors:
//!
//! - [`ser`]: a compact binary codec. Shared and cyclic object graphs
//!   flatten into a stream of top-level entries keyed by first-seen wire
//!   ids; unknown fields skip cleanly on decode.
//! - [`tree`]: a type-erased in-memory form of the same data, usable for
//!   cloning, diffing and decoding without the original classes.
//! - [`compare`]: descriptor-driven deep equality with per-type overrides.
//! - [`envelope`]: length-prefixed records over files or arbitrary streams.
//!
//! ```
//! use refract::impl_reflectable;
//! use refract::rtti::{FieldDescriptor, InstancePool, TypeDescriptorBuilder, TypeRegistry};
//! use refract::ser::{BinaryDecoder, BinaryEncoder, DecodeOptions, EncodeOptions};
//! use refract::stream::MemoryStream;
//!
//! #[derive(Default)]
//! struct Health {
//!     points: u32,
//! }
//! impl_reflectable!(Health, 100);
//!
//! # fn main() -> refract::Result<()> {
//! let registry = TypeRegistry::new();
//! registry.register(
//!     TypeDescriptorBuilder::new(100, "Health", || Box::new(Health::default()))
//!         .field(FieldDescriptor::plain::<Health, u32, _, _>(
//!             0,
//!             "points",
//!             |h| &h.points,
//!             |h, v| h.points = v,
//!         ))
//!         .build()?,
//! )?;
//!
//! let mut pool = InstancePool::new();
//! let id = pool.insert(Box::new(Health { points: 7 }));
//!
//! let mut stream = MemoryStream::new();
//! let written = BinaryEncoder::new(&registry).encode(
//!     &pool,
//!     id,
//!     &mut stream,
//!     &EncodeOptions::default(),
//! )?;
//!
//! let mut stream = MemoryStream::from_vec(stream.into_inner());
//! let (decoded, root) = BinaryDecoder::new(&registry).decode(
//!     &mut stream,
//!     written as u32,
//!     &DecodeOptions::default(),
//! )?;
//! assert_eq!(decoded.get_as::<Health>(root).unwrap().points, 7);
//! # Ok(())
//! # }
//! ```

pub mod arena;
pub mod compare;
pub mod envelope;
pub mod error;
pub mod rtti;
pub mod ser;
pub mod stream;
pub mod tree;

pub use error::{Error, Result};
pub use tree::clone_instance;
