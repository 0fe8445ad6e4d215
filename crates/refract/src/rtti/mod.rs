// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type/field descriptor system.
//!
//! Generic code walks an object's fields without compile-time knowledge of
//! its concrete type: a [`TypeRegistry`] maps stable numeric ids to
//! [`TypeDescriptor`]s whose [`FieldDescriptor`]s carry type-erased
//! accessors. The codec, tree model and comparator all traverse through this
//! one system, so field-kind dispatch and hierarchy-walking rules are
//! identical across them.

mod field;
mod hooks;
mod plain;
mod reflectable;
mod registry;
mod type_descriptor;

pub use field::{
    BlockField, EmbeddedField, ExternalBlock, FieldDescriptor, FieldKind, PlainField,
    SharedRefField,
};
pub use plain::PlainValue;
pub use reflectable::{FieldId, InstanceId, InstancePool, Reflectable, TypeId};
pub use registry::TypeRegistry;
pub use type_descriptor::{FactoryFn, TraversalHook, TypeDescriptor, TypeDescriptorBuilder};

pub(crate) use field::{cast, cast_box, cast_mut, ArrayOps, EmbeddedGet, EmbeddedSet};
pub(crate) use hooks::HookScope;
pub(crate) use registry::RegisteredType;
