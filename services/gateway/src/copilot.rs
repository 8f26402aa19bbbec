//! Copilot chat backend
//!
//! Concrete `ChatBackend` over the Copilot chat-completions endpoint.
//! `send` spawns one request task per session that feeds an event channel,
//! which gives the orchestrator real message/error events to race against
//! its timeout; `close` aborts the task if it is still in flight.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::summary::{ChatBackend, ChatEvent, ChatSessionHandle};

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// Chat backend talking to the Copilot API
#[derive(Clone)]
pub struct CopilotBackend {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl CopilotBackend {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl ChatBackend for CopilotBackend {
    async fn open(&self, token: &str) -> anyhow::Result<Box<dyn ChatSessionHandle>> {
        let (events_tx, events_rx) = mpsc::channel(4);

        Ok(Box::new(CopilotSession {
            http: self.http.clone(),
            url: format!("{}/chat/completions", self.base_url),
            model: self.model.clone(),
            token: token.to_string(),
            events_tx,
            events_rx,
            task: None,
        }))
    }
}

struct CopilotSession {
    http: reqwest::Client,
    url: String,
    model: String,
    token: String,
    events_tx: mpsc::Sender<ChatEvent>,
    events_rx: mpsc::Receiver<ChatEvent>,
    task: Option<JoinHandle<()>>,
}

#[async_trait]
impl ChatSessionHandle for CopilotSession {
    async fn send(&mut self, prompt: String) -> anyhow::Result<()> {
        let http = self.http.clone();
        let url = self.url.clone();
        let model = self.model.clone();
        let token = self.token.clone();
        let events = self.events_tx.clone();

        self.task = Some(tokio::spawn(async move {
            let event = request_completion(&http, &url, &model, &token, &prompt).await;
            // The receiver may already be gone if the timeout won the race
            let _ = events.send(event).await;
        }));

        Ok(())
    }

    async fn recv(&mut self) -> Option<ChatEvent> {
        self.events_rx.recv().await
    }

    async fn close(self: Box<Self>) {
        if let Some(task) = self.task {
            task.abort();
        }
    }
}

async fn request_completion(
    http: &reqwest::Client,
    url: &str,
    model: &str,
    token: &str,
    prompt: &str,
) -> ChatEvent {
    let response = http
        .post(url)
        .bearer_auth(token)
        .json(&serde_json::json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
        }))
        .send()
        .await;

    let response = match response {
        Ok(response) => response,
        Err(e) => return ChatEvent::Error(format!("chat request failed: {}", e)),
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return ChatEvent::Error(format!("chat backend returned {}: {}", status, body));
    }

    match response.json::<ChatCompletionResponse>().await {
        Ok(completion) => match completion.choices.into_iter().next() {
            Some(choice) => ChatEvent::AssistantMessage(choice.message.content),
            None => ChatEvent::Error("chat backend returned no choices".to_string()),
        },
        Err(e) => ChatEvent::Error(format!("chat response could not be parsed: {}", e)),
    }
}
