//! Orchestrator Registry: one [`Supervisor`] per project, addressable by
//! project id, mirroring the shape of `HarnessRegistry` but holding
//! long-lived per-project state rather than stateless provider handles.

use std::collections::HashMap;
use std::fmt;

use crate::supervisor::{Supervisor, SupervisorConfig};

pub struct OrchestratorRegistry {
    supervisors: HashMap<String, Supervisor>,
}

impl OrchestratorRegistry {
    pub fn new() -> Self {
        Self {
            supervisors: HashMap::new(),
        }
    }

    /// Registers a supervisor for `project_id`, returning the previous one
    /// if the project was already registered.
    pub fn register(&mut self, project_id: impl Into<String>, config: SupervisorConfig) -> Option<Supervisor> {
        self.supervisors.insert(project_id.into(), Supervisor::new(config))
    }

    pub fn get_mut(&mut self, project_id: &str) -> Option<&mut Supervisor> {
        self.supervisors.get_mut(project_id)
    }

    pub fn remove(&mut self, project_id: &str) -> Option<Supervisor> {
        self.supervisors.remove(project_id)
    }

    pub fn project_ids(&self) -> Vec<&str> {
        self.supervisors.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.supervisors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.supervisors.is_empty()
    }
}

impl Default for OrchestratorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OrchestratorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestratorRegistry")
            .field("projects", &self.supervisors.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_starts_empty() {
        assert!(OrchestratorRegistry::new().is_empty());
    }

    #[test]
    fn register_and_get_mut() {
        let mut registry = OrchestratorRegistry::new();
        registry.register("proj-a", SupervisorConfig::default());
        assert!(registry.get_mut("proj-a").is_some());
        assert!(registry.get_mut("proj-b").is_none());
    }

    #[test]
    fn register_replaces_existing() {
        let mut registry = OrchestratorRegistry::new();
        assert!(registry.register("proj-a", SupervisorConfig::default()).is_none());
        assert!(registry.register("proj-a", SupervisorConfig::default()).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_drops_supervisor() {
        let mut registry = OrchestratorRegistry::new();
        registry.register("proj-a", SupervisorConfig::default());
        assert!(registry.remove("proj-a").is_some());
        assert!(registry.is_empty());
    }
}
