// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-wide type-descriptor registry.
//!
//! Registration resolves the full schema chain (this level plus every parent
//! level, most-derived first) up front, so traversal later is plain index
//! iteration over data. The map is concurrent; after warm-up it is
//! effectively read-only and lock-free for readers.

use std::sync::{Arc, OnceLock};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{Error, Result};

use super::reflectable::{Reflectable, TypeId};
use super::type_descriptor::TypeDescriptor;

pub(crate) struct RegisteredType {
    pub(crate) desc: Arc<TypeDescriptor>,
    /// Schema chain, most-derived first, ending at the hierarchy root.
    pub(crate) chain: Vec<Arc<TypeDescriptor>>,
}

/// Concurrent map from type id to descriptor plus its resolved chain.
pub struct TypeRegistry {
    types: DashMap<TypeId, Arc<RegisteredType>>,
}

static GLOBAL: OnceLock<TypeRegistry> = OnceLock::new();

impl TypeRegistry {
    /// A fresh registry with the built-in serialized-tree types installed.
    pub fn new() -> Self {
        let registry = Self {
            types: DashMap::new(),
        };
        if let Err(err) = crate::tree::reflect::register_builtins(&registry) {
            // Built-in descriptors are statically valid.
            unreachable!("built-in descriptor registration failed: {err}");
        }
        registry
    }

    /// The process-wide registry, created on first access.
    pub fn global() -> &'static TypeRegistry {
        GLOBAL.get_or_init(TypeRegistry::new)
    }

    /// Registers a descriptor. The parent level, if any, must already be
    /// registered; duplicate type ids are rejected.
    pub fn register(&self, descriptor: TypeDescriptor) -> Result<()> {
        let desc = Arc::new(descriptor);
        let mut chain = vec![Arc::clone(&desc)];
        let mut parent = desc.parent_type();
        while let Some(pid) = parent {
            let entry = self.types.get(&pid).ok_or_else(|| Error::MissingParent {
                type_name: desc.name().to_owned(),
                parent: pid,
            })?;
            chain.push(Arc::clone(&entry.desc));
            parent = entry.desc.parent_type();
        }

        match self.types.entry(desc.id()) {
            Entry::Occupied(_) => Err(Error::DuplicateTypeId(desc.id())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(RegisteredType { desc, chain }));
                Ok(())
            }
        }
    }

    pub fn contains(&self, id: TypeId) -> bool {
        self.types.contains_key(&id)
    }

    pub fn get(&self, id: TypeId) -> Option<Arc<TypeDescriptor>> {
        self.types.get(&id).map(|e| Arc::clone(&e.desc))
    }

    pub(crate) fn lookup(&self, id: TypeId) -> Result<Arc<RegisteredType>> {
        self.types
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .ok_or(Error::UnknownType(id))
    }

    /// Schema chain for a type, most-derived first.
    pub fn chain(&self, id: TypeId) -> Option<Vec<Arc<TypeDescriptor>>> {
        self.types.get(&id).map(|e| e.chain.clone())
    }

    /// Allocates a blank instance via the type's registered factory.
    pub fn create_instance(&self, id: TypeId) -> Result<Box<dyn Reflectable>> {
        Ok(self.lookup(id)?.desc.create_instance())
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
