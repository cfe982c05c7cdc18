use async_trait::async_trait;
use conductor_core::{ConductorResult, Project, TaskDraft};
use conductor_orchestrator::parse_decomposition;

/// Produces a decomposition for a project without persisting anything.
///
/// Deployments backed by an external planning service plug their client in
/// here; the gateway only renders what it returns.
#[async_trait]
pub trait DecompositionPreviewer: Send + Sync {
    /// Draft tasks for `project`.
    async fn preview(&self, project: &Project) -> ConductorResult<Vec<TaskDraft>>;
}

/// Runs the decomposition parser over the project's PRD text.
///
/// A project without a PRD previews as an empty list.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParserPreviewer;

#[async_trait]
impl DecompositionPreviewer for ParserPreviewer {
    async fn preview(&self, project: &Project) -> ConductorResult<Vec<TaskDraft>> {
        Ok(project
            .prd
            .as_deref()
            .map(parse_decomposition)
            .unwrap_or_default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use conductor_core::TaskType;

    #[tokio::test]
    async fn test_parser_previewer_reads_prd() {
        let project = Project::new("shop", "web shop")
            .with_prd("1. Design schema\ntype: design\nTables for orders.\n2. Ship it\ntype: deployment");
        let drafts = ParserPreviewer.preview(&project).await.unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].task_type, TaskType::Design);
        assert_eq!(drafts[1].title, "Ship it");
    }

    #[tokio::test]
    async fn test_parser_previewer_without_prd() {
        let project = Project::new("empty", "");
        assert!(ParserPreviewer.preview(&project).await.unwrap().is_empty());
    }
}
