//! # Retrieval-Augmented Chat
//!
//! [`RagOrchestrator`] answers the last message of a conversation from the
//! stored documentation. The answer is delivered as a stream of [`ChatEvent`]s:
//!
//! 1. `Citations` for the retrieved passages, deduplicated by URL. Each citation
//!    lists every retrieved position it stands for, so a reference tag naming a
//!    dropped duplicate still resolves.
//! 2. `TextDelta`s in the order the generator produced them.
//! 3. `FollowUpPrompts`, computed concurrently with the answer and emitted last.
//!    Omitted if follow-up generation fails or times out.
//! 4. `Finish`.
//!
//! A generation failure ends the stream with a single masked `Error` event.
//! If the receiver is dropped at any point after `answer` returns, generation is
//! abandoned and the follow-up task is aborted.

use crate::{
    citations::{
        build_citations, dedup_by_url, format_grounding_context, remap_references, Citation,
    },
    constants::{CHAT_HISTORY_WINDOW, CHAT_TOP_K, FOLLOW_UP_PROMPT_COUNT},
    embedder::BatchEmbedder,
    errors::RagError,
    prompts::{
        render_system_prompt, ANSWER_SYSTEM_PROMPT, FOLLOW_UP_SYSTEM_PROMPT,
        FOLLOW_UP_USER_PROMPT,
    },
    providers::{
        ai::{generate_structured, GenerationOptions, Generator},
        db::storage::InteractionLog,
    },
    retriever::VectorRetriever,
    retry::{retry, RetryPolicy},
    types::{ChatMessage, InteractionRecord},
};
use chrono::Utc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// The only error text a client ever sees for a failed answer.
pub const MASKED_ERROR_MESSAGE: &str = "An error occurred while generating the response.";

const EVENT_BUFFER: usize = 64;

/// Chat behaviour knobs, loaded from the `chat` section of the configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Name of the documented project, substituted into the prompts.
    #[serde(default = "default_project")]
    pub project: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_follow_up_timeout_secs")]
    pub follow_up_timeout_secs: u64,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_answer_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_follow_up_system_prompt")]
    pub follow_up_system_prompt: String,
}

fn default_project() -> String {
    "the project".to_string()
}

fn default_top_k() -> usize {
    CHAT_TOP_K
}

fn default_history_window() -> usize {
    CHAT_HISTORY_WINDOW
}

fn default_follow_up_timeout_secs() -> u64 {
    30
}

fn default_answer_system_prompt() -> String {
    ANSWER_SYSTEM_PROMPT.to_string()
}

fn default_follow_up_system_prompt() -> String {
    FOLLOW_UP_SYSTEM_PROMPT.to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            project: default_project(),
            top_k: default_top_k(),
            history_window: default_history_window(),
            follow_up_timeout_secs: default_follow_up_timeout_secs(),
            temperature: None,
            max_tokens: None,
            system_prompt: default_answer_system_prompt(),
            follow_up_system_prompt: default_follow_up_system_prompt(),
        }
    }
}

/// One item of the answer stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ChatEvent {
    Citations(Vec<Citation>),
    #[serde(rename = "text")]
    TextDelta(String),
    FollowUpPrompts(Vec<String>),
    Error(String),
    Finish,
}

impl ChatEvent {
    /// The event name used on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            ChatEvent::Citations(_) => "citations",
            ChatEvent::TextDelta(_) => "text",
            ChatEvent::FollowUpPrompts(_) => "followUpPrompts",
            ChatEvent::Error(_) => "error",
            ChatEvent::Finish => "finish",
        }
    }
}

/// Where a chat session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Embedding,
    Retrieving,
    /// Answer tokens are streaming while follow-ups are computed.
    Streaming,
    Finalizing,
    Done,
    Error,
}

#[derive(Debug)]
struct Session {
    id: Uuid,
    state: SessionState,
}

impl Session {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(session = %self.id, from = ?self.state, to = ?next, "Chat session transition.");
        self.state = next;
    }
}

/// Aborts the wrapped task when dropped, so an abandoned answer never leaves
/// follow-up generation running.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Debug, Deserialize)]
struct FollowUps {
    #[serde(rename = "followUpPrompts")]
    follow_up_prompts: Vec<String>,
}

/// Everything the streaming task needs, owned so it can outlive the request handler.
struct StreamJob {
    session: Session,
    query: String,
    history: Vec<ChatMessage>,
    passages_context: String,
    citations: Vec<Citation>,
    system_prompt: String,
    follow_up_system_prompt: String,
    options: GenerationOptions,
    follow_up_timeout: Duration,
    generator: Arc<dyn Generator>,
    follow_up_generator: Arc<dyn Generator>,
    interaction_log: Option<Arc<dyn InteractionLog>>,
    retry_policy: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct RagOrchestrator {
    embedder: Arc<BatchEmbedder>,
    retriever: VectorRetriever,
    generator: Arc<dyn Generator>,
    follow_up_generator: Arc<dyn Generator>,
    interaction_log: Option<Arc<dyn InteractionLog>>,
    retry_policy: RetryPolicy,
    config: ChatConfig,
}

impl RagOrchestrator {
    pub fn new(
        embedder: Arc<BatchEmbedder>,
        retriever: VectorRetriever,
        generator: Arc<dyn Generator>,
        config: ChatConfig,
    ) -> Self {
        Self {
            embedder,
            retriever,
            follow_up_generator: generator.clone(),
            generator,
            interaction_log: None,
            retry_policy: RetryPolicy::default(),
            config,
        }
    }

    /// Uses a different provider for follow-up questions than for the answer.
    pub fn with_follow_up_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.follow_up_generator = generator;
        self
    }

    /// Records each completed answer in `log`.
    pub fn with_interaction_log(mut self, log: Arc<dyn InteractionLog>) -> Self {
        self.interaction_log = Some(log);
        self
    }

    /// Retry policy for the structured follow-up call.
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Answers the last message of `messages`.
    ///
    /// Embedding and retrieval happen before this returns, so their failures are
    /// returned as errors. Everything after that is reported through the stream.
    pub async fn answer(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<ReceiverStream<ChatEvent>, RagError> {
        let mut session = Session::new();

        let query = messages
            .last()
            .map(|m| m.content.trim().to_string())
            .unwrap_or_default();
        if query.is_empty() {
            return Err(RagError::Validation("Missing query parameter".to_string()));
        }

        session.transition(SessionState::Embedding);
        let query_vector = self.embedder.embed(&query).await.inspect_err(|e| {
            error!(session = %session.id, "Failed to embed query: {e}");
        })?;

        session.transition(SessionState::Retrieving);
        let passages = self
            .retriever
            .retrieve(&query_vector, self.config.top_k)
            .await
            .inspect_err(|e| error!(session = %session.id, "Retrieval failed: {e}"))?;
        info!(session = %session.id, passages = passages.len(), "Retrieved grounding passages.");

        let passages_context = format_grounding_context(&passages);
        let citations = build_citations(&passages);
        let system_prompt = render_system_prompt(
            &self.config.system_prompt,
            &self.config.project,
            &passages_context,
        );
        let history_start = messages.len().saturating_sub(self.config.history_window.max(1));
        let history = messages[history_start..].to_vec();

        let job = StreamJob {
            session,
            query,
            history,
            passages_context,
            citations,
            system_prompt,
            follow_up_system_prompt: self.config.follow_up_system_prompt.clone(),
            options: GenerationOptions {
                temperature: self.config.temperature,
                max_tokens: self.config.max_tokens,
            },
            follow_up_timeout: Duration::from_secs(self.config.follow_up_timeout_secs),
            generator: self.generator.clone(),
            follow_up_generator: self.follow_up_generator.clone(),
            interaction_log: self.interaction_log.clone(),
            retry_policy: self.retry_policy,
        };
        let project = self.config.project.clone();

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(run_stream(job, project, tx));
        Ok(ReceiverStream::new(rx))
    }
}

async fn run_stream(mut job: StreamJob, project: String, tx: mpsc::Sender<ChatEvent>) {
    let session_id = job.session.id;

    if tx
        .send(ChatEvent::Citations(dedup_by_url(&job.citations)))
        .await
        .is_err()
    {
        debug!(session = %session_id, "Client went away before citations were sent.");
        return;
    }

    job.session.transition(SessionState::Streaming);
    let follow_up_system =
        render_system_prompt(&job.follow_up_system_prompt, &project, &job.passages_context);
    let follow_up_user = FOLLOW_UP_USER_PROMPT.replace("{query}", &job.query);
    let mut follow_ups = AbortOnDrop(tokio::spawn(generate_follow_ups(
        job.follow_up_generator.clone(),
        job.retry_policy,
        follow_up_system,
        follow_up_user,
    )));

    let started = tokio::select! {
        started = job.generator.stream(&job.system_prompt, &job.history, &job.options) => started,
        _ = tx.closed() => {
            info!(session = %session_id, "Client disconnected before generation started.");
            return;
        }
    };
    let mut tokens = match started {
        Ok(tokens) => tokens,
        Err(e) => {
            fail(&mut job.session, &tx, &e).await;
            return;
        }
    };

    let mut answer = String::new();
    loop {
        let next = tokio::select! {
            next = tokens.next() => next,
            _ = tx.closed() => {
                info!(session = %session_id, "Client disconnected; abandoning generation.");
                return;
            }
        };
        match next {
            Some(Ok(delta)) => {
                answer.push_str(&delta);
                if tx.send(ChatEvent::TextDelta(delta)).await.is_err() {
                    info!(session = %session_id, "Client disconnected; abandoning generation.");
                    return;
                }
            }
            Some(Err(e)) => {
                fail(&mut job.session, &tx, &e).await;
                return;
            }
            None => break,
        }
    }
    drop(tokens);

    job.session.transition(SessionState::Finalizing);
    if let Some(log) = job.interaction_log.clone() {
        let ai_response = remap_references(&answer, &job.citations).unwrap_or(answer);
        let record = InteractionRecord {
            id: Uuid::new_v4().to_string(),
            user_message: job.query.clone(),
            ai_response,
            created_at: Utc::now(),
        };
        tokio::spawn(async move {
            if let Err(e) = log.record_interaction(&record).await {
                warn!("Failed to record interaction: {e}");
            }
        });
    }

    let follow_up_result = tokio::select! {
        result = tokio::time::timeout(job.follow_up_timeout, &mut follow_ups.0) => result,
        _ = tx.closed() => {
            info!(session = %session_id, "Client disconnected; dropping follow-up generation.");
            return;
        }
    };
    match follow_up_result {
        Ok(Ok(Ok(prompts))) if !prompts.is_empty() => {
            if tx.send(ChatEvent::FollowUpPrompts(prompts)).await.is_err() {
                return;
            }
        }
        Ok(Ok(Ok(_))) => debug!(session = %session_id, "No follow-up prompts generated."),
        Ok(Ok(Err(e))) => warn!(session = %session_id, "Follow-up generation failed: {e}"),
        Ok(Err(e)) => warn!(session = %session_id, "Follow-up task ended abnormally: {e}"),
        Err(_) => warn!(session = %session_id, "Follow-up generation timed out."),
    }

    let _ = tx.send(ChatEvent::Finish).await;
    job.session.transition(SessionState::Done);
}

async fn fail(session: &mut Session, tx: &mpsc::Sender<ChatEvent>, cause: &RagError) {
    error!(session = %session.id, "Answer generation failed: {cause}");
    session.transition(SessionState::Error);
    let _ = tx
        .send(ChatEvent::Error(MASKED_ERROR_MESSAGE.to_string()))
        .await;
}

async fn generate_follow_ups(
    generator: Arc<dyn Generator>,
    retry_policy: RetryPolicy,
    system_prompt: String,
    user_prompt: String,
) -> Result<Vec<String>, RagError> {
    let schema = json!({
        "type": "object",
        "properties": {
            "followUpPrompts": {
                "type": "array",
                "items": { "type": "string" },
                "description": "3 relevant follow-up questions related to the query"
            }
        },
        "required": ["followUpPrompts"]
    });
    let schema = &schema;
    let generator = generator.as_ref();
    let system_prompt = system_prompt.as_str();
    let user_prompt = user_prompt.as_str();

    let follow_ups: FollowUps = retry(
        &retry_policy,
        "follow-up generation",
        RagError::is_transient_provider_error,
        |_| generate_structured(generator, schema, system_prompt, user_prompt),
    )
    .await?;

    Ok(follow_ups
        .follow_up_prompts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .take(FOLLOW_UP_PROMPT_COUNT)
        .collect())
}
