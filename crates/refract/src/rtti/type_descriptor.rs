// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-type metadata: ordered fields, parent link, factory, traversal hooks
//! and an optional comparison override.

use std::any::Any;
use std::sync::Arc;

use crate::compare::CompareOverride;
use crate::error::{Error, Result};

use super::field::FieldDescriptor;
use super::reflectable::{FieldId, Reflectable, TypeId};

/// Allocates a blank instance for decode.
pub type FactoryFn = fn() -> Box<dyn Reflectable>;

/// Invoked once per (object, level) before/after field iteration.
///
/// Hooks receive a shared borrow; per-object staging they produce lives
/// behind interior mutability on the object itself.
pub type TraversalHook = Arc<dyn Fn(&dyn Reflectable, Option<&dyn Any>) + Send + Sync>;

/// Metadata for one type level.
///
/// A concrete Rust type may register several descriptor levels chained via
/// `parent` to model an inheritance hierarchy; all levels' accessors operate
/// on the same concrete type. Traversal always walks most-derived → root.
pub struct TypeDescriptor {
    id: TypeId,
    name: String,
    parent: Option<TypeId>,
    factory: FactoryFn,
    fields: Vec<FieldDescriptor>,
    on_started: Option<TraversalHook>,
    on_ended: Option<TraversalHook>,
    compare_override: Option<Arc<dyn CompareOverride>>,
}

impl std::fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

impl TypeDescriptor {
    pub fn new(id: TypeId, name: &str, parent: Option<TypeId>, factory: FactoryFn) -> Self {
        Self {
            id,
            name: name.to_owned(),
            parent,
            factory,
            fields: Vec::new(),
            on_started: None,
            on_ended: None,
            compare_override: None,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Immediate base level, or `None` at the hierarchy root.
    pub fn parent_type(&self) -> Option<TypeId> {
        self.parent
    }

    /// Registers a field. Duplicate ids or names at this level fail eagerly.
    pub fn add_field(&mut self, field: FieldDescriptor) -> Result<()> {
        if self.fields.iter().any(|f| f.id() == field.id()) {
            return Err(Error::DuplicateFieldId {
                type_name: self.name.clone(),
                id: field.id(),
            });
        }
        if self.fields.iter().any(|f| f.name() == field.name()) {
            return Err(Error::DuplicateFieldName {
                type_name: self.name.clone(),
                field: field.name().to_owned(),
            });
        }
        self.fields.push(field);
        Ok(())
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field_at(&self, index: usize) -> Option<&FieldDescriptor> {
        self.fields.get(index)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter()
    }

    /// Field declared at this level under `id`, ignoring parent levels.
    pub fn find_field(&self, id: FieldId) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.id() == id)
    }

    pub fn create_instance(&self) -> Box<dyn Reflectable> {
        (self.factory)()
    }

    pub fn set_traversal_started(&mut self, hook: TraversalHook) {
        self.on_started = Some(hook);
    }

    pub fn set_traversal_ended(&mut self, hook: TraversalHook) {
        self.on_ended = Some(hook);
    }

    pub fn set_compare_override(&mut self, handler: Arc<dyn CompareOverride>) {
        self.compare_override = Some(handler);
    }

    pub fn compare_override(&self) -> Option<&Arc<dyn CompareOverride>> {
        self.compare_override.as_ref()
    }

    pub(crate) fn notify_started(&self, obj: &dyn Reflectable, ctx: Option<&dyn Any>) {
        if let Some(hook) = &self.on_started {
            hook(obj, ctx);
        }
    }

    pub(crate) fn notify_ended(&self, obj: &dyn Reflectable, ctx: Option<&dyn Any>) {
        if let Some(hook) = &self.on_ended {
            hook(obj, ctx);
        }
    }
}

/// Fluent construction of a [`TypeDescriptor`].
///
/// Validation happens in [`build`](Self::build), before the descriptor can
/// reach a registry.
pub struct TypeDescriptorBuilder {
    descriptor: TypeDescriptor,
    fields: Vec<FieldDescriptor>,
}

impl TypeDescriptorBuilder {
    pub fn new(id: TypeId, name: &str, factory: FactoryFn) -> Self {
        Self {
            descriptor: TypeDescriptor::new(id, name, None, factory),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn parent(mut self, parent: TypeId) -> Self {
        self.descriptor.parent = Some(parent);
        self
    }

    #[must_use]
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn on_traversal_started(mut self, hook: TraversalHook) -> Self {
        self.descriptor.on_started = Some(hook);
        self
    }

    #[must_use]
    pub fn on_traversal_ended(mut self, hook: TraversalHook) -> Self {
        self.descriptor.on_ended = Some(hook);
        self
    }

    #[must_use]
    pub fn compare_with(mut self, handler: Arc<dyn CompareOverride>) -> Self {
        self.descriptor.compare_override = Some(handler);
        self
    }

    pub fn build(mut self) -> Result<TypeDescriptor> {
        for field in self.fields {
            self.descriptor.add_field(field)?;
        }
        Ok(self.descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impl_reflectable;
    use crate::rtti::FieldDescriptor;

    #[derive(Default)]
    struct Widget {
        width: u32,
        height: u32,
    }

    impl_reflectable!(Widget, 920);

    fn widget_factory() -> Box<dyn Reflectable> {
        Box::new(Widget::default())
    }

    #[test]
    fn fields_keep_declaration_order() {
        let desc = TypeDescriptorBuilder::new(920, "Widget", widget_factory)
            .field(FieldDescriptor::plain::<Widget, u32, _, _>(
                0,
                "width",
                |w| &w.width,
                |w, v| w.width = v,
            ))
            .field(FieldDescriptor::plain::<Widget, u32, _, _>(
                1,
                "height",
                |w| &w.height,
                |w, v| w.height = v,
            ))
            .build()
            .unwrap();

        assert_eq!(desc.field_count(), 2);
        assert_eq!(desc.field_at(0).unwrap().name(), "width");
        assert_eq!(desc.field_at(1).unwrap().name(), "height");
        assert_eq!(desc.find_field(1).unwrap().name(), "height");
        assert!(desc.find_field(9).is_none());
    }

    #[test]
    fn duplicate_field_id_fails_eagerly() {
        let err = TypeDescriptorBuilder::new(920, "Widget", widget_factory)
            .field(FieldDescriptor::plain::<Widget, u32, _, _>(
                0,
                "width",
                |w| &w.width,
                |w, v| w.width = v,
            ))
            .field(FieldDescriptor::plain::<Widget, u32, _, _>(
                0,
                "height",
                |w| &w.height,
                |w, v| w.height = v,
            ))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateFieldId { id: 0, .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn duplicate_field_name_fails_eagerly() {
        let mut desc = TypeDescriptor::new(920, "Widget", None, widget_factory);
        desc.add_field(FieldDescriptor::plain::<Widget, u32, _, _>(
            0,
            "width",
            |w| &w.width,
            |w, v| w.width = v,
        ))
        .unwrap();
        let err = desc
            .add_field(FieldDescriptor::plain::<Widget, u32, _, _>(
                1,
                "width",
                |w| &w.height,
                |w, v| w.height = v,
            ))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateFieldName { .. }));
    }

    #[test]
    fn factory_builds_blank_instances() {
        let desc = TypeDescriptor::new(920, "Widget", None, widget_factory);
        let blank = desc.create_instance();
        assert_eq!(blank.descriptor_id(), 920);
    }
}
