use std::collections::HashMap;

use super::Tensor;

/// A named source of truth for model variables.
pub trait VarStore {
    /// Looks up a variable.
    ///
    /// # Arguments
    /// * `name` - The name of the variable.
    ///
    /// # Returns
    /// The tensor held by the variable or `None` if it doesn't exist.
    fn find(&self, name: &str) -> Option<&Tensor>;

    /// Mutable access to a variable, creating an empty one when it doesn't exist.
    ///
    /// # Arguments
    /// * `name` - The name of the variable.
    ///
    /// # Returns
    /// The tensor held by the variable.
    fn get_mut(&mut self, name: &str) -> &mut Tensor;
}

/// An in memory `VarStore`.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    vars: HashMap<String, Tensor>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a variable.
    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.vars.insert(name.into(), tensor);
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl VarStore for Scope {
    fn find(&self, name: &str) -> Option<&Tensor> {
        self.vars.get(name)
    }

    fn get_mut(&mut self, name: &str) -> &mut Tensor {
        self.vars.entry(name.to_string()).or_default()
    }
}
