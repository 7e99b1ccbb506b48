//! Terraform_Apply: hands model-written code to the execution sandbox

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::sandbox::ExecutionSandbox;
use crate::tools::{SecurityLevel, Tool, ToolContext, ToolResult};

pub struct TerraformApplyTool {
    sandbox: Arc<ExecutionSandbox>,
}

impl TerraformApplyTool {
    pub fn new(sandbox: Arc<ExecutionSandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for TerraformApplyTool {
    fn name(&self) -> &str {
        "Terraform_Apply"
    }

    fn description(&self) -> &str {
        "Use this tool to execute Terraform code. \
INPUT: The input must be ONLY the Terraform Resource/Variable blocks. \
DO NOT include the 'provider' block. \
DO NOT write code in the 'Thought'. Pass the code entirely to 'Action Input'."
    }

    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::Dangerous
    }

    async fn execute(&self, input: &str, _ctx: &ToolContext) -> Result<ToolResult> {
        // Failure narratives are observations too; the model decides what to do next
        Ok(ToolResult::success(self.sandbox.apply(input).await))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::sandbox::default_preamble;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_apply_tool_returns_narrative_verbatim() {
        let root = TempDir::new().unwrap();
        let script = root.path().join("tf");
        std::fs::write(
            &script,
            "#!/bin/sh\nif [ \"$1\" = apply ]; then echo 'Error: quota exceeded' >&2; exit 1; fi\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let sandbox = ExecutionSandbox::new(root.path().join("work"), default_preamble("us-east-1"))
            .with_binary(&script);
        let tool = TerraformApplyTool::new(Arc::new(sandbox));

        let result = tool
            .execute("resource \"aws_s3_bucket\" \"logs\" {}", &ToolContext::default())
            .await
            .unwrap();

        assert!(result.text().starts_with("Error during tf apply"));
        assert!(result.text().contains("quota exceeded"));
        assert_eq!(result.observation(), result.text());
    }
}
