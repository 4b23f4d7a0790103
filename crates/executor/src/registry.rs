//! Component-key lookup of executors.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::executor::Executor;

/// Type-erased registry mapping component keys to executors.
///
/// Populated once at startup; the orchestration step resolves each claimed
/// node's component key through it. Executors are `Arc`-shared across
/// concurrent steps.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an executor under a component key. Replaces any previous
    /// registration of the same key.
    pub fn register(&mut self, component: impl Into<String>, executor: Arc<dyn Executor>) {
        self.executors.insert(component.into(), executor);
    }

    /// Looks up an executor by component key.
    #[must_use]
    pub fn get(&self, component: &str) -> Option<&Arc<dyn Executor>> {
        self.executors.get(component)
    }

    /// Whether a component key is registered.
    #[must_use]
    pub fn contains(&self, component: &str) -> bool {
        self.executors.contains_key(component)
    }

    /// All registered component keys.
    #[must_use]
    pub fn components(&self) -> Vec<&str> {
        self.executors.keys().map(String::as_str).collect()
    }

    /// Number of registered executors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.executors.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("count", &self.executors.len())
            .field("components", &self.executors.keys().collect::<Vec<_>>())
            .finish()
    }
}
