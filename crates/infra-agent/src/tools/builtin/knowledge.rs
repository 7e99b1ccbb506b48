//! Terraform_Knowledge_Base: similarity search over indexed examples

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::knowledge::Retriever;
use crate::tools::{SecurityLevel, Tool, ToolContext, ToolResult};

pub const NO_DOCUMENTS: &str = "No relevant documents found.";

pub struct KnowledgeTool {
    retriever: Arc<dyn Retriever>,
    top_k: usize,
}

impl KnowledgeTool {
    pub fn new(retriever: Arc<dyn Retriever>, top_k: usize) -> Self {
        Self { retriever, top_k }
    }
}

#[async_trait]
impl Tool for KnowledgeTool {
    fn name(&self) -> &str {
        "Terraform_Knowledge_Base"
    }

    fn description(&self) -> &str {
        "Useful for finding Terraform code examples."
    }

    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::Safe
    }

    #[instrument(skip(self, _ctx), fields(top_k = self.top_k))]
    async fn execute(&self, input: &str, _ctx: &ToolContext) -> Result<ToolResult> {
        let fragments = self.retriever.retrieve(input.trim(), self.top_k).await?;
        debug!(found = fragments.len(), "Knowledge lookup");

        if fragments.is_empty() {
            return Ok(ToolResult::success(NO_DOCUMENTS));
        }

        let joined = fragments
            .into_iter()
            .map(|f| f.text)
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(ToolResult::success(joined))
    }
}
