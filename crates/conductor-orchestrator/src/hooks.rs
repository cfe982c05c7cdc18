//! Best-effort side effects run after a task finishes.
//!
//! Both collaborators default to no-ops; the dispatch pipeline calls them
//! unconditionally and only logs their failures.

use async_trait::async_trait;
use conductor_core::{ConductorError, ConductorResult, Task};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;

/// The side-effect collaborators handed to the dispatch pipeline.
#[derive(Clone)]
pub struct Hooks {
    pub git: Arc<dyn GitCommitter>,
    pub notifier: Arc<dyn Notifier>,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            git: Arc::new(NoopGitCommitter),
            notifier: Arc::new(NoopNotifier),
        }
    }
}

/// Records a completed task's changes in version control.
#[async_trait]
pub trait GitCommitter: Send + Sync {
    async fn commit_task(&self, task: &Task) -> ConductorResult<()>;
}

/// Committer that does nothing.
pub struct NoopGitCommitter;

#[async_trait]
impl GitCommitter for NoopGitCommitter {
    async fn commit_task(&self, _task: &Task) -> ConductorResult<()> {
        Ok(())
    }
}

/// Commits the working tree of a repository with the `git` binary.
pub struct CommandGitCommitter {
    repo_path: PathBuf,
}

impl CommandGitCommitter {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    async fn git(&self, args: &[&str]) -> ConductorResult<std::process::Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .output()
            .await
            .map_err(|e| ConductorError::Execution(format!("failed to run git: {e}")))
    }
}

/// `task(<type>): <title>`.
pub fn commit_subject(task: &Task) -> String {
    format!("task({}): {}", task.task_type, task.title)
}

#[async_trait]
impl GitCommitter for CommandGitCommitter {
    async fn commit_task(&self, task: &Task) -> ConductorResult<()> {
        let add = self.git(&["add", "-A"]).await?;
        if !add.status.success() {
            return Err(ConductorError::Execution(format!(
                "git add failed: {}",
                String::from_utf8_lossy(&add.stderr).trim()
            )));
        }

        let subject = commit_subject(task);
        let body = format!("Task-Id: {}", task.id);
        let commit = self.git(&["commit", "-m", &subject, "-m", &body]).await?;
        if commit.status.success() {
            debug!(task_id = %task.id, repo = %self.repo_path.display(), "Committed task output");
            return Ok(());
        }

        let stdout = String::from_utf8_lossy(&commit.stdout);
        let stderr = String::from_utf8_lossy(&commit.stderr);
        if stdout.contains("nothing to commit") || stdout.contains("nothing added to commit") {
            debug!(task_id = %task.id, "Nothing to commit");
            return Ok(());
        }
        Err(ConductorError::Execution(format!(
            "git commit failed: {}",
            stderr.trim()
        )))
    }
}

/// Payload delivered to notification channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub event: String,
    pub task_id: Uuid,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn task_completed(task: &Task) -> Self {
        Self {
            event: "task:completed".into(),
            task_id: task.id,
            title: task.title.clone(),
            message: format!("Task '{}' completed", task.title),
        }
    }

    pub fn task_failed(task: &Task, error: &str) -> Self {
        Self {
            event: "task:failed".into(),
            task_id: task.id,
            title: task.title.clone(),
            message: format!("Task '{}' failed: {error}", task.title),
        }
    }
}

/// Delivers notifications about task outcomes.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> ConductorResult<()>;
}

/// Notifier that does nothing.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _notification: &Notification) -> ConductorResult<()> {
        Ok(())
    }
}

/// POSTs each notification as JSON to a fixed URL.
pub struct WebhookNotifier {
    url: String,
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> ConductorResult<()> {
        let response = self
            .http
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| ConductorError::Http(format!("webhook unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(ConductorError::Http(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use conductor_core::TaskType;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn task() -> Task {
        Task::new(Uuid::new_v4(), "Add login", "Build the login form").with_type(TaskType::Design)
    }

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    fn git_sync(dir: &std::path::Path, args: &[&str]) {
        let status = std::process::Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap()
            .status;
        assert!(status.success(), "git {args:?} failed");
    }

    #[test]
    fn test_commit_subject() {
        assert_eq!(commit_subject(&task()), "task(design): Add login");
    }

    #[tokio::test]
    async fn test_noop_hooks() {
        let t = task();
        NoopGitCommitter.commit_task(&t).await.unwrap();
        NoopNotifier
            .notify(&Notification::task_completed(&t))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_command_committer_commits_and_tolerates_clean_tree() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        git_sync(dir.path(), &["init", "-q"]);
        git_sync(dir.path(), &["config", "user.email", "conductor@example.com"]);
        git_sync(dir.path(), &["config", "user.name", "Conductor"]);
        std::fs::write(dir.path().join("login.txt"), "form").unwrap();

        let committer = CommandGitCommitter::new(dir.path());
        let t = task();
        committer.commit_task(&t).await.unwrap();

        let log = std::process::Command::new("git")
            .args(["log", "-1", "--format=%B"])
            .current_dir(dir.path())
            .output()
            .unwrap();
        let message = String::from_utf8_lossy(&log.stdout);
        assert!(message.contains("task(design): Add login"));
        assert!(message.contains(&t.id.to_string()));

        // Second commit with a clean tree is not an error.
        committer.commit_task(&t).await.unwrap();
    }

    #[tokio::test]
    async fn test_command_committer_outside_repo_fails() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let committer = CommandGitCommitter::new(dir.path().join("missing"));
        assert!(committer.commit_task(&task()).await.is_err());
    }

    #[tokio::test]
    async fn test_webhook_notifier_posts_json() {
        let server = MockServer::start().await;
        let t = task();
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "event": "task:failed",
                "title": "Add login"
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(server.uri());
        notifier
            .notify(&Notification::task_failed(&t, "boom"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_webhook_notifier_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(server.uri());
        let err = notifier
            .notify(&Notification::task_completed(&task()))
            .await
            .unwrap_err();
        assert!(matches!(err, ConductorError::Http(_)));
    }
}
