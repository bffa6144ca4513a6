use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::OracleError;
use crate::models::plan::OrganizationPlan;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// The external planner. Implementations must report an exhausted context
/// window as `OracleError::ContextOverflow` so the gateway can compact.
#[async_trait]
pub trait PlanningOracle: Send + Sync {
    async fn complete(&self, transcript: &[ChatMessage]) -> Result<String, OracleError>;

    /// Schema-constrained variant. `None` means unsupported and the gateway
    /// falls back to `complete`.
    async fn structured_plan(
        &self,
        _transcript: &[ChatMessage],
    ) -> Option<Result<OrganizationPlan, OracleError>> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleReply {
    Text(String),
    Plan(OrganizationPlan),
}

impl OracleReply {
    fn transcript_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Plan(plan) => serde_json::to_string(&plan.actions).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
struct Session {
    id: Uuid,
    messages: Vec<ChatMessage>,
}

impl Session {
    fn seeded(messages: Vec<ChatMessage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            messages,
        }
    }

    /// First and most recent entries only, under a fresh id.
    fn compacted(&self) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(first) = self.messages.first() {
            messages.push(first.clone());
        }
        if self.messages.len() > 1 {
            if let Some(last) = self.messages.last() {
                messages.push(last.clone());
            }
        }
        Self::seeded(messages)
    }

    fn commit(&mut self, prompt: &str, reply: String, max_messages: usize) {
        self.messages.push(ChatMessage::user(prompt));
        self.messages.push(ChatMessage::assistant(reply));
        if self.messages.len() > max_messages {
            let excess = self.messages.len() - max_messages;
            // Index 0 holds the instructions and always survives.
            self.messages.drain(1..=excess);
        }
    }
}

/// Owns the conversational session with the oracle. The session is replaced,
/// never patched, when the oracle reports a context overflow.
pub struct OracleGateway {
    oracle: Arc<dyn PlanningOracle>,
    session: Mutex<Session>,
    max_messages: usize,
    requests: AtomicUsize,
}

impl OracleGateway {
    pub fn new(
        oracle: Arc<dyn PlanningOracle>,
        instructions: impl Into<String>,
        max_messages: usize,
    ) -> Self {
        Self {
            oracle,
            session: Mutex::new(Session::seeded(vec![ChatMessage::system(instructions)])),
            max_messages: max_messages.max(3),
            requests: AtomicUsize::new(0),
        }
    }

    pub async fn respond(&self, prompt: &str) -> Result<String, OracleError> {
        match self.send(prompt, false).await? {
            OracleReply::Text(text) => Ok(text),
            reply @ OracleReply::Plan(_) => Ok(reply.transcript_text()),
        }
    }

    /// Like `respond`, but prefers a typed plan when the oracle supports one.
    pub async fn respond_plan(&self, prompt: &str) -> Result<OracleReply, OracleError> {
        self.send(prompt, true).await
    }

    pub async fn session_id(&self) -> Uuid {
        self.session.lock().await.id
    }

    pub async fn transcript(&self) -> Vec<ChatMessage> {
        self.session.lock().await.messages.clone()
    }

    /// Prompts submitted so far, counting an overflow retry once.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    async fn send(&self, prompt: &str, structured: bool) -> Result<OracleReply, OracleError> {
        let mut session = self.session.lock().await;
        self.requests.fetch_add(1, Ordering::SeqCst);

        match self.exchange(&session, prompt, structured).await {
            Ok(reply) => {
                session.commit(prompt, reply.transcript_text(), self.max_messages);
                Ok(reply)
            }
            Err(err) if err.is_context_overflow() => {
                let compacted = session.compacted();
                tracing::warn!(
                    old_session = %session.id,
                    new_session = %compacted.id,
                    dropped = session.messages.len() - compacted.messages.len(),
                    "oracle context exceeded, retrying with compacted transcript"
                );
                *session = compacted;
                let reply = self.exchange(&session, prompt, structured).await?;
                session.commit(prompt, reply.transcript_text(), self.max_messages);
                Ok(reply)
            }
            Err(err) => Err(err),
        }
    }

    async fn exchange(
        &self,
        session: &Session,
        prompt: &str,
        structured: bool,
    ) -> Result<OracleReply, OracleError> {
        let mut transcript = session.messages.clone();
        transcript.push(ChatMessage::user(prompt));

        if structured {
            if let Some(result) = self.oracle.structured_plan(&transcript).await {
                return result.map(OracleReply::Plan);
            }
        }

        let text = self.oracle.complete(&transcript).await?;
        if text.trim().is_empty() {
            return Err(OracleError::EmptyResponse);
        }
        tracing::debug!(session = %session.id, chars = text.len(), "oracle replied");
        Ok(OracleReply::Text(text))
    }
}
