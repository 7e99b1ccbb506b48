//! Built-in tools exposed to the agent

mod knowledge;
mod terraform;
mod web_search;

pub use knowledge::KnowledgeTool;
pub use terraform::TerraformApplyTool;
pub use web_search::{DuckDuckGoSearch, InternetSearchTool, SearchBackend};

use anyhow::Result;
use std::sync::Arc;

use super::registry::ToolRegistry;
use crate::knowledge::Retriever;
use crate::sandbox::ExecutionSandbox;

/// Create the registry with the three standard tools
pub fn create_default_registry(
    retriever: Arc<dyn Retriever>,
    top_k: usize,
    sandbox: Arc<ExecutionSandbox>,
    search: Arc<dyn SearchBackend>,
    char_budget: usize,
) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();

    registry.register(KnowledgeTool::new(retriever, top_k))?;
    registry.register(TerraformApplyTool::new(sandbox))?;
    registry.register(InternetSearchTool::new(search, char_budget))?;

    Ok(registry)
}
