//! AI summary orchestration
//!
//! Produces a short natural-language summary of one issue. The live AI
//! path runs one chat session per request (never pooled), bounded by a
//! fixed timeout; any failure other than a missing Copilot subscription
//! degrades to a deterministic summary built from the issue's own fields.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::github::Issue;

/// Hard ceiling on one AI attempt; hitting it is classified exactly like
/// a backend error.
pub const AI_TIMEOUT: Duration = Duration::from_secs(30);

/// Fixed closing line of every fallback summary
pub const FALLBACK_CALL_TO_ACTION: &str =
    "Review the full issue on GitHub and decide whether to keep or close it.";

/// Event emitted by a chat session
#[derive(Debug)]
pub enum ChatEvent {
    /// The assistant produced its reply
    AssistantMessage(String),
    /// The backend reported a failure
    Error(String),
}

/// One live conversation with the AI backend.
///
/// `close` consumes the session, so teardown can only ever run once.
#[async_trait]
pub trait ChatSessionHandle: Send {
    /// Submit the prompt
    async fn send(&mut self, prompt: String) -> anyhow::Result<()>;

    /// Wait for the next event; `None` means the backend went away
    async fn recv(&mut self) -> Option<ChatEvent>;

    /// Tear the session down, best-effort
    async fn close(self: Box<Self>);
}

/// Factory for chat sessions
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn open(&self, token: &str) -> anyhow::Result<Box<dyn ChatSessionHandle>>;
}

/// Custom error type for summary requests that cannot be absorbed
#[derive(Error, Debug)]
pub enum SummaryError {
    /// The backend rejected the user for lack of Copilot access; surfaced
    /// distinctly so the client can explain the subscription requirement
    #[error("AI summaries require an active GitHub Copilot subscription")]
    CopilotRequired,
}

/// How a summary was produced
#[derive(Debug)]
pub enum SummaryOutcome {
    /// Exact assistant message content
    Ai(String),
    /// Deterministic template; the AI path failed
    Fallback(String),
}

/// Drives the AI backend for one summary at a time
#[derive(Clone)]
pub struct SummaryOrchestrator {
    backend: Arc<dyn ChatBackend>,
    timeout: Duration,
}

impl SummaryOrchestrator {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            timeout: AI_TIMEOUT,
        }
    }

    /// Override the AI timeout (tests)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Summarize one issue.
    ///
    /// Subscription problems are the only failure a caller sees as an
    /// error; everything else resolves to a fallback summary.
    pub async fn summarize_issue(
        &self,
        token: &str,
        issue: &Issue,
    ) -> Result<SummaryOutcome, SummaryError> {
        match self.try_ai_summary(token, issue).await {
            Ok(summary) => {
                info!("AI summary produced for {}#{}", issue.repository, issue.number);
                Ok(SummaryOutcome::Ai(summary))
            }
            Err(failure) if is_copilot_access_error(&failure) => {
                warn!("AI backend rejected the user: {}", failure);
                Err(SummaryError::CopilotRequired)
            }
            Err(failure) => {
                warn!("AI summary failed ({}), using fallback", failure);
                Ok(SummaryOutcome::Fallback(fallback_summary(issue)))
            }
        }
    }

    /// One AI attempt: open a session, send the prompt, then race the
    /// backend's reply, the backend's error, and the timeout. The first
    /// outcome wins; dropping the select disarms the losing branch, and
    /// close runs exactly once on every path that opened a session.
    async fn try_ai_summary(&self, token: &str, issue: &Issue) -> Result<String, String> {
        let mut session = self
            .backend
            .open(token)
            .await
            .map_err(|e| format!("{:#}", e))?;

        if let Err(e) = session.send(build_prompt(issue)).await {
            session.close().await;
            return Err(format!("{:#}", e));
        }

        let outcome = tokio::select! {
            event = session.recv() => match event {
                Some(ChatEvent::AssistantMessage(text)) => Ok(text),
                Some(ChatEvent::Error(message)) => Err(message),
                None => Err("chat backend closed the stream".to_string()),
            },
            _ = tokio::time::sleep(self.timeout) => {
                Err(format!("AI summary timed out after {}s", self.timeout.as_secs()))
            }
        };

        session.close().await;
        outcome
    }
}

/// Whether a failure message points at missing Copilot access rather
/// than a transient fault. Case-insensitive, matched on the terms the
/// backend uses for authorization and subscription rejections.
fn is_copilot_access_error(message: &str) -> bool {
    let lowered = message.to_lowercase();
    ["unauthorized", "forbidden", "403", "401", "copilot", "subscription"]
        .iter()
        .any(|term| lowered.contains(term))
}

/// Build the deterministic prompt for one issue.
pub fn build_prompt(issue: &Issue) -> String {
    let labels = if issue.labels.is_empty() {
        "None".to_string()
    } else {
        issue
            .labels
            .iter()
            .map(|l| l.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let body = issue
        .body
        .as_deref()
        .filter(|b| !b.trim().is_empty())
        .unwrap_or("No description provided.");

    format!(
        "Summarize this GitHub issue in 2-3 sentences. Cover what the issue is about, \
         the key problem, and a recommended triage action. Do not use any markdown formatting.\n\n\
         Title: {}\n\
         Issue number: #{}\n\
         Repository: {}\n\
         State: {}\n\
         Labels: {}\n\
         Created: {}\n\
         Author: {}\n\n\
         {}",
        issue.title,
        issue.number,
        issue.repository,
        issue.state,
        labels,
        issue.created_at.to_rfc3339(),
        issue.user,
        body,
    )
}

/// Assemble a summary from the issue's own fields. This path never fails.
pub fn fallback_summary(issue: &Issue) -> String {
    let mut summary = format!("Issue #{}: {}.", issue.number, issue.title);

    if !issue.labels.is_empty() {
        let names = issue
            .labels
            .iter()
            .map(|l| l.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        summary.push_str(&format!(" Labeled: {}.", names));
    }

    if let Some(sentence) = issue.body.as_deref().and_then(first_sentence) {
        if sentence.len() < 200 {
            summary.push_str(&format!(" {}.", sentence));
        }
    }

    summary.push(' ');
    summary.push_str(FALLBACK_CALL_TO_ACTION);
    summary
}

fn first_sentence(body: &str) -> Option<&str> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    let end = trimmed
        .find(['.', '!', '?', '\n'])
        .unwrap_or(trimmed.len());
    let sentence = trimmed[..end].trim();
    (!sentence.is_empty()).then_some(sentence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::Label;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    enum FakeScript {
        Reply(String),
        Fail(String),
        Hang,
    }

    struct FakeBackend {
        script: FakeScript,
        closes: Arc<AtomicUsize>,
    }

    struct FakeSession {
        script: Option<FakeScript>,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ChatBackend for FakeBackend {
        async fn open(&self, _token: &str) -> anyhow::Result<Box<dyn ChatSessionHandle>> {
            Ok(Box::new(FakeSession {
                script: Some(self.script.clone()),
                closes: self.closes.clone(),
            }))
        }
    }

    #[async_trait]
    impl ChatSessionHandle for FakeSession {
        async fn send(&mut self, _prompt: String) -> anyhow::Result<()> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<ChatEvent> {
            match self.script.take() {
                Some(FakeScript::Reply(text)) => Some(ChatEvent::AssistantMessage(text)),
                Some(FakeScript::Fail(message)) => Some(ChatEvent::Error(message)),
                Some(FakeScript::Hang) | None => std::future::pending().await,
            }
        }

        async fn close(self: Box<Self>) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn orchestrator(script: FakeScript) -> (SummaryOrchestrator, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        let backend = FakeBackend {
            script,
            closes: closes.clone(),
        };
        (SummaryOrchestrator::new(Arc::new(backend)), closes)
    }

    fn sample_issue() -> Issue {
        Issue {
            id: 100,
            number: 42,
            title: "Login button unresponsive on mobile".to_string(),
            state: "open".to_string(),
            labels: vec![Label {
                name: "bug".to_string(),
                color: "d73a4a".to_string(),
            }],
            repository: "octocat/hello-world".to_string(),
            user: "octocat".to_string(),
            body: Some("Tapping the login button does nothing. Tested on iOS 17.".to_string()),
            created_at: "2024-05-01T12:00:00Z".parse().unwrap(),
            updated_at: "2024-05-02T12:00:00Z".parse().unwrap(),
            summary: None,
        }
    }

    #[tokio::test]
    async fn test_ai_success_returns_exact_content_and_closes_once() {
        let (orchestrator, closes) = orchestrator(FakeScript::Reply("The summary.".into()));

        let outcome = orchestrator
            .summarize_issue("ghp_x", &sample_issue())
            .await
            .unwrap();

        match outcome {
            SummaryOutcome::Ai(text) => assert_eq!(text, "The summary."),
            other => panic!("expected AI outcome, got {:?}", other),
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_subscription_failure_is_distinguished() {
        let (orchestrator, closes) =
            orchestrator(FakeScript::Fail("HTTP 403: Copilot subscription required".into()));

        let result = orchestrator.summarize_issue("ghp_x", &sample_issue()).await;

        assert!(matches!(result, Err(SummaryError::CopilotRequired)));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_generic_failure_falls_back() {
        let (orchestrator, closes) =
            orchestrator(FakeScript::Fail("upstream had a bad day".into()));
        let issue = sample_issue();

        let outcome = orchestrator.summarize_issue("ghp_x", &issue).await.unwrap();

        match outcome {
            SummaryOutcome::Fallback(text) => {
                assert!(text.contains(&issue.title));
                assert!(text.ends_with(FALLBACK_CALL_TO_ACTION));
            }
            other => panic!("expected fallback, got {:?}", other),
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let (orchestrator, closes) = orchestrator(FakeScript::Hang);
        let orchestrator = orchestrator.with_timeout(Duration::from_millis(20));

        let outcome = orchestrator
            .summarize_issue("ghp_x", &sample_issue())
            .await
            .unwrap();

        assert!(matches!(outcome, SummaryOutcome::Fallback(_)));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_copilot_access_classifier() {
        assert!(is_copilot_access_error("HTTP 403 Forbidden"));
        assert!(is_copilot_access_error("Unauthorized: bad credentials"));
        assert!(is_copilot_access_error("no Copilot subscription found"));
        assert!(!is_copilot_access_error("connection reset by peer"));
        assert!(!is_copilot_access_error("AI summary timed out after 30s"));
    }

    #[test]
    fn test_prompt_includes_issue_fields() {
        let prompt = build_prompt(&sample_issue());
        assert!(prompt.contains("Login button unresponsive on mobile"));
        assert!(prompt.contains("#42"));
        assert!(prompt.contains("octocat/hello-world"));
        assert!(prompt.contains("Labels: bug"));
        assert!(prompt.contains("Author: octocat"));
        assert!(prompt.contains("markdown"));
    }

    #[test]
    fn test_prompt_placeholders_without_labels_or_body() {
        let mut issue = sample_issue();
        issue.labels.clear();
        issue.body = None;

        let prompt = build_prompt(&issue);
        assert!(prompt.contains("Labels: None"));
        assert!(prompt.contains("No description provided."));
    }

    #[test]
    fn test_fallback_summary_shape() {
        let issue = sample_issue();
        let summary = fallback_summary(&issue);

        assert!(summary.contains("Issue #42"));
        assert!(summary.contains(&issue.title));
        assert!(summary.contains("Labeled: bug."));
        assert!(summary.contains("Tapping the login button does nothing"));
        assert!(summary.ends_with(FALLBACK_CALL_TO_ACTION));
    }

    #[test]
    fn test_fallback_skips_long_first_sentence() {
        let mut issue = sample_issue();
        issue.body = Some("x".repeat(300));

        let summary = fallback_summary(&issue);
        assert!(!summary.contains(&"x".repeat(300)));
        assert!(summary.ends_with(FALLBACK_CALL_TO_ACTION));
    }
}
