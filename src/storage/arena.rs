use std::ops::Range;

use crate::storage::{Result, TableErr};

/// A named window into an `Arena`, stored as an offset and a length instead of a sub-slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct View {
    offset: usize,
    len: usize,
}

impl View {
    /// Creates a new `View`.
    ///
    /// # Arguments
    /// * `offset` - The index of the first element of the view.
    /// * `len` - The amount of elements in the view.
    ///
    /// # Returns
    /// A new `View` instance.
    pub fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The index range this view covers.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// One owned, contiguous, fixed-size block of `f32`s.
///
/// Sub-tensors are never borrowed out as long lived pointers, they are addressed
/// through `View`s and resolved to slices only for the duration of an access.
#[derive(Debug, Clone, PartialEq)]
pub struct Arena {
    data: Box<[f32]>,
}

impl Arena {
    /// Creates a new zeroed `Arena`.
    ///
    /// # Arguments
    /// * `len` - The amount of elements to allocate.
    ///
    /// # Returns
    /// A new `Arena` instance.
    pub fn zeroed(len: usize) -> Self {
        Self {
            data: vec![0.; len].into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Resolves `view` into a slice of this arena.
    ///
    /// # Panics
    /// If `view` lies outside of the arena, views are only ever built from the
    /// same layout that sized the arena.
    pub fn view(&self, view: View) -> &[f32] {
        &self.data[view.range()]
    }

    /// Mutable counterpart of `Arena::view`.
    pub fn view_mut(&mut self, view: View) -> &mut [f32] {
        &mut self.data[view.range()]
    }

    /// Copies the whole arena into `out`.
    ///
    /// # Returns
    /// A `SizeMismatch` error if `out` isn't the same size as the arena.
    pub fn copy_to(&self, out: &mut [f32]) -> Result<()> {
        if out.len() != self.data.len() {
            return Err(TableErr::SizeMismatch {
                got: out.len(),
                expected: self.data.len(),
            });
        }

        out.copy_from_slice(&self.data);
        Ok(())
    }
}
