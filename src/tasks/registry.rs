//! Name-based task lookup.
//!
//! Two registries cover the two dispatch points: [`TaskTypeRegistry`] maps a
//! type identifier to a constructor plus a capability descriptor (new task
//! kinds register once at process start), while [`TaskRegistry`] resolves an
//! already-constructed task instance by name for the stacks. [`TaskTable`]
//! is the plain map-backed implementation of the latter; it also assigns
//! each inserted task its slice in the provider's global stacked buffers.

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{ConfigurationError, Result};

use super::{TaskEntry, TaskFunction};

/// Instance lookup consumed by the stacks.
pub trait TaskRegistry {
    fn resolve(&self, name: &str) -> Option<Rc<TaskEntry>>;
}

/// Map-backed [`TaskRegistry`] that stacks inserted tasks into one global
/// buffer layout by cumulative sum.
#[derive(Default)]
pub struct TaskTable {
    entries: HashMap<String, Rc<TaskEntry>>,
    total_length: usize,
    total_length_jacobian: usize,
}

impl TaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task instance under `name`, assigning it the next
    /// contiguous slice of the global value/Jacobian buffers.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        function: Box<dyn TaskFunction>,
    ) -> Rc<TaskEntry> {
        let name = name.into();
        let entry = Rc::new(TaskEntry::new(
            name.clone(),
            function,
            self.total_length,
            self.total_length_jacobian,
        ));
        self.total_length += entry.length;
        self.total_length_jacobian += entry.length_jacobian;
        self.entries.insert(name, Rc::clone(&entry));
        entry
    }

    /// Total value length of the global stacked buffer.
    pub fn total_length(&self) -> usize {
        self.total_length
    }

    /// Total Jacobian-row count of the global stacked buffer.
    pub fn total_length_jacobian(&self) -> usize {
        self.total_length_jacobian
    }
}

impl TaskRegistry for TaskTable {
    fn resolve(&self, name: &str) -> Option<Rc<TaskEntry>> {
        self.entries.get(name).cloned()
    }
}

/// What a task type can compute, declared at registration time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskCapabilities {
    pub task_dim: usize,
    pub has_jacobian: bool,
    pub has_hessian: bool,
}

struct TaskType {
    capabilities: TaskCapabilities,
    construct: Box<dyn Fn() -> Box<dyn TaskFunction>>,
}

/// Factory registry mapping type identifiers to constructors.
#[derive(Default)]
pub struct TaskTypeRegistry {
    types: HashMap<String, TaskType>,
}

impl TaskTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        capabilities: TaskCapabilities,
        construct: impl Fn() -> Box<dyn TaskFunction> + 'static,
    ) {
        self.types.insert(
            name.into(),
            TaskType {
                capabilities,
                construct: Box::new(construct),
            },
        );
    }

    pub fn capabilities(&self, name: &str) -> Option<&TaskCapabilities> {
        self.types.get(name).map(|t| &t.capabilities)
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn TaskFunction>> {
        let ty = self
            .types
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownTask {
                name: name.to_string(),
            })?;
        Ok((ty.construct)())
    }
}
