use std::collections::BTreeMap;

use crate::storage::{Arena, View};

/// Read access to named tensors aliased into a flat arena.
#[derive(Debug, Clone, Copy)]
pub struct TensorViews<'a> {
    arena: &'a Arena,
    views: &'a BTreeMap<String, View>,
}

impl<'a> TensorViews<'a> {
    pub(super) fn new(arena: &'a Arena, views: &'a BTreeMap<String, View>) -> Self {
        Self { arena, views }
    }

    /// The values of tensor `name`, if it's aliased into this arena.
    pub fn get(&self, name: &str) -> Option<&'a [f32]> {
        self.views.get(name).map(|&view| self.arena.view(view))
    }

    /// The whole arena.
    pub fn flat(&self) -> &'a [f32] {
        self.arena.as_slice()
    }
}

/// Write access to named tensors aliased into a flat arena.
#[derive(Debug)]
pub struct TensorViewsMut<'a> {
    arena: &'a mut Arena,
    views: &'a BTreeMap<String, View>,
}

impl<'a> TensorViewsMut<'a> {
    pub(super) fn new(arena: &'a mut Arena, views: &'a BTreeMap<String, View>) -> Self {
        Self { arena, views }
    }

    /// The values of tensor `name`, if it's aliased into this arena.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut [f32]> {
        let view = *self.views.get(name)?;
        Some(self.arena.view_mut(view))
    }

    /// The whole arena.
    pub fn flat_mut(&mut self) -> &mut [f32] {
        self.arena.as_mut_slice()
    }
}
