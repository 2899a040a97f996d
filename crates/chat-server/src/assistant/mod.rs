//! Assistant orchestration.
//!
//! Watches newly appended human messages, detects assistant-directed text,
//! maintains a bounded per-conversation context, and dispatches an
//! independent generation task per triggering message. Generation failures
//! become transcript-visible assistant messages and never cross the service
//! boundary.

pub mod triggers;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use genai::chat::{ChatMessage, ChatOptions, ChatRequest};
use genai::Client as GenAiClient;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::blocks::BlockRegistry;
use crate::error::{ChatError, GenerationError};
use crate::models::{Conversation, Message, MessageCategory, ASSISTANT_SENDER};
use crate::store::ConversationStore;

/// Assistant configuration.
#[derive(Clone, Debug)]
pub struct AssistantConfig {
    /// Model passed to the generation client.
    pub model: String,
    /// Fixed system instruction sent with every generation call.
    pub system_prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Max retained (role, text) turns per conversation.
    pub context_cap: usize,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            system_prompt: "You are a helpful AI assistant in a chat application. \
                Provide clear, concise, and helpful responses. When asked to \
                summarize, provide a brief summary. When asked to explain, \
                provide clear explanations. Be conversational and friendly."
                .to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            context_cap: 20,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
}

/// One entry in a conversation's bounded context window.
#[derive(Clone, Debug)]
pub struct ContextTurn {
    pub role: TurnRole,
    pub text: String,
}

impl ContextTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            text: text.into(),
        }
    }
}

/// Bounded per-conversation context cache.
///
/// Not a system of record: the durable message log is the source of truth,
/// this exists to keep generation calls cheap. Oldest turns are evicted
/// when the cap is exceeded.
pub struct ContextStore {
    cap: usize,
    turns: Mutex<HashMap<String, VecDeque<ContextTurn>>>,
}

impl ContextStore {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            turns: Mutex::new(HashMap::new()),
        }
    }

    pub fn push(&self, key: &str, turn: ContextTurn) {
        let mut turns = self.turns.lock();
        let window = turns.entry(key.to_string()).or_default();
        window.push_back(turn);
        while window.len() > self.cap {
            window.pop_front();
        }
    }

    pub fn snapshot(&self, key: &str) -> Vec<ContextTurn> {
        self.turns
            .lock()
            .get(key)
            .map(|w| w.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, key: &str) -> usize {
        self.turns.lock().get(key).map(|w| w.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, key: &str) -> bool {
        self.len(key) == 0
    }

    /// Discard the context window without touching durable history.
    pub fn clear(&self, key: &str) {
        self.turns.lock().remove(key);
    }
}

/// External generation boundary: prior turns plus a fixed system
/// instruction in, generated text or a classified failure out.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(
        &self,
        config: &AssistantConfig,
        turns: &[ContextTurn],
    ) -> Result<String, GenerationError>;
}

/// Generator backed by the genai client.
pub struct GenAiGenerator {
    client: GenAiClient,
}

impl GenAiGenerator {
    pub fn new() -> Self {
        Self {
            client: GenAiClient::default(),
        }
    }
}

impl Default for GenAiGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResponseGenerator for GenAiGenerator {
    async fn generate(
        &self,
        config: &AssistantConfig,
        turns: &[ContextTurn],
    ) -> Result<String, GenerationError> {
        let mut chat_messages = vec![ChatMessage::system(&config.system_prompt)];
        for turn in turns {
            match turn.role {
                TurnRole::User => chat_messages.push(ChatMessage::user(&turn.text)),
                TurnRole::Assistant => chat_messages.push(ChatMessage::assistant(&turn.text)),
            }
        }

        let chat_req = ChatRequest::new(chat_messages);
        let options = ChatOptions::default()
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens);

        info!("[Assistant] Calling {} for response...", config.model);

        let response = self
            .client
            .exec_chat(&config.model, chat_req, Some(&options))
            .await
            .map_err(|e| GenerationError::classify(e.to_string()))?;

        response
            .first_text()
            .map(|t| t.to_string())
            .ok_or_else(|| GenerationError::Unknown("no response text generated".to_string()))
    }
}

/// Per-conversation assistant state machine.
pub struct AssistantOrchestrator {
    config: AssistantConfig,
    store: Arc<dyn ConversationStore>,
    blocks: Arc<BlockRegistry>,
    generator: Arc<dyn ResponseGenerator>,
    contexts: Arc<ContextStore>,
}

impl AssistantOrchestrator {
    pub fn new(
        config: AssistantConfig,
        store: Arc<dyn ConversationStore>,
        blocks: Arc<BlockRegistry>,
        generator: Arc<dyn ResponseGenerator>,
    ) -> Self {
        let contexts = Arc::new(ContextStore::new(config.context_cap));
        Self {
            config,
            store,
            blocks,
            generator,
            contexts,
        }
    }

    /// Inspect a newly appended message and, when it is assistant-directed,
    /// dispatch an independent generation task.
    ///
    /// Returns whether a task was dispatched. Never blocks on generation:
    /// the conversation stays usable while a response is pending, and the
    /// task completes even if every observer unsubscribes meanwhile.
    pub async fn handle_message(
        &self,
        conversation: &Conversation,
        message: &Message,
    ) -> Result<bool, ChatError> {
        if message.is_assistant() {
            return Ok(false);
        }

        // A block in either direction suppresses trigger detection entirely.
        if let Some(other) = conversation.other_participant(&message.sender) {
            if self.blocks.any_block(&message.sender, other).await? {
                debug!(
                    "[Assistant] Suppressed in {} (block between {} and {})",
                    conversation.key, message.sender, other
                );
                return Ok(false);
            }
        }

        if !triggers::is_assistant_directed(&message.body) {
            return Ok(false);
        }

        let payload = triggers::strip_trigger(&message.body);
        info!(
            "[Assistant] Triggered in {} by {}",
            conversation.key, message.sender
        );

        let key = conversation.key.clone();
        self.contexts.push(&key, ContextTurn::user(&payload));
        let turns = self.contexts.snapshot(&key);

        let store = self.store.clone();
        let generator = self.generator.clone();
        let config = self.config.clone();
        let contexts = self.contexts.clone();
        let task_key = key.clone();

        tokio::spawn(async move {
            match generator.generate(&config, &turns).await {
                Ok(text) => {
                    contexts.push(&task_key, ContextTurn::assistant(&text));
                    if let Err(e) = store
                        .append_message(
                            &task_key,
                            ASSISTANT_SENDER,
                            &text,
                            MessageCategory::AssistantReply,
                        )
                        .await
                    {
                        warn!("[Assistant] Failed to append response: {}", e);
                    } else {
                        info!("[Assistant] Responded in {}", task_key);
                    }
                }
                Err(e) => {
                    warn!("[Assistant] Generation failed in {}: {}", task_key, e);
                    let visible = e.transcript_message();
                    if let Err(e2) = store
                        .append_message(
                            &task_key,
                            ASSISTANT_SENDER,
                            &visible,
                            MessageCategory::AssistantReply,
                        )
                        .await
                    {
                        warn!("[Assistant] Failed to append error message: {}", e2);
                    }
                }
            }
        });

        Ok(true)
    }

    /// Discard a conversation's context window; durable history is untouched.
    pub fn clear_context(&self, key: &str) {
        self.contexts.clear(key);
        info!("[Assistant] Context cleared for {}", key);
    }

    /// Current context window length, for diagnostics and tests.
    pub fn context_len(&self, key: &str) -> usize {
        self.contexts.len(key)
    }
}
