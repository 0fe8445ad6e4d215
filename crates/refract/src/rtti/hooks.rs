// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Deferred-cleanup guard around traversal lifecycle hooks.
//!
//! `enter` fires a level's traversal-started hook and records it; dropping
//! the scope fires the matching traversal-ended hooks in reverse order on
//! every exit path, early returns and errors included.

use std::any::Any;
use std::sync::Arc;

use super::reflectable::Reflectable;
use super::type_descriptor::TypeDescriptor;

pub(crate) struct HookScope<'a> {
    obj: &'a dyn Reflectable,
    ctx: Option<&'a dyn Any>,
    entered: Vec<Arc<TypeDescriptor>>,
}

impl<'a> HookScope<'a> {
    pub(crate) fn new(obj: &'a dyn Reflectable, ctx: Option<&'a dyn Any>) -> Self {
        Self {
            obj,
            ctx,
            entered: Vec::new(),
        }
    }

    pub(crate) fn enter(&mut self, desc: &Arc<TypeDescriptor>) {
        desc.notify_started(self.obj, self.ctx);
        self.entered.push(Arc::clone(desc));
    }
}

impl Drop for HookScope<'_> {
    fn drop(&mut self) {
        for desc in self.entered.iter().rev() {
            desc.notify_ended(self.obj, self.ctx);
        }
    }
}
