//! Ordered, name-unique set of tools offered to the agent

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{bail, Result};

use super::Tool;

/// Tools in registration order, which is also the order of the prompt catalogue
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool; names must be unique
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        let name = tool.name().to_string();
        if self.by_name.contains_key(&name) {
            bail!("Tool already registered: {}", name);
        }
        self.by_name.insert(name, self.tools.len());
        self.tools.push(Arc::new(tool));
        Ok(())
    }

    /// Exact, case-sensitive lookup
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.by_name.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    pub fn list_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn all_tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.clone()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.list_names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{SecurityLevel, ToolContext, ToolResult};
    use async_trait::async_trait;

    struct MockTool(&'static str);

    #[async_trait]
    impl Tool for MockTool {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "A mock tool for testing"
        }

        fn security_level(&self) -> SecurityLevel {
            SecurityLevel::Safe
        }

        async fn execute(&self, _input: &str, _ctx: &ToolContext) -> Result<ToolResult> {
            Ok(ToolResult::success("mock output"))
        }
    }

    #[test]
    fn test_registry_register_and_get() {
        let mut registry = ToolRegistry::new();
        registry.register(MockTool("mock")).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.get("mock").is_some());
        assert!(registry.get("Mock").is_none());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn test_registry_keeps_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(MockTool("zeta")).unwrap();
        registry.register(MockTool("alpha")).unwrap();
        registry.register(MockTool("mid")).unwrap();

        assert_eq!(registry.list_names(), vec!["zeta", "alpha", "mid"]);
        let names: Vec<_> = registry.all_tools().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = ToolRegistry::new();
        registry.register(MockTool("mock")).unwrap();
        assert!(registry.register(MockTool("mock")).is_err());
        assert_eq!(registry.len(), 1);
    }
}
