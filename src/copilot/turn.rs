//! Turn Pipeline
//!
//! One user message in, one assistant reply out:
//!
//! ```text
//! moderate input ─► load/create session ─► detect language ─► extract
//!   ─► settle stage ─► select follow-up ─► detect ambiguity ─► persist snapshot
//!   ─► (create case) ─► assemble prompt ─► complete ─► moderate output
//!   ─► persist messages
//! ```
//!
//! [`TurnProcessor::prepare`] runs everything up to prompt assembly so that
//! request-level failures (blocked input, unknown session) surface before a
//! response stream is opened. [`TurnProcessor::complete`] and
//! [`TurnProcessor::stream`] finish the turn in batch or streaming mode.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::ambiguity::{self, AmbiguityContext, AmbiguityResult};
use super::bridge::{self, CaseCreationResult, CaseManager, ConversationState};
use super::collected::CollectedInfo;
use super::extractor;
use super::followup::{self, FollowUpQuestion};
use super::language::{Language, detect_language};
use super::prompt::{self, PromptInput};
use super::reply::{FormSuggestion, ReplyStreamFilter, parse_reply};
use super::snapshot::ContextSnapshot;
use super::stage::{self, ConversationStage};
use crate::ai::{
    ChatMessage, CompletionOptions, ModerationVerdict, SharedModerator, SharedProvider,
    StreamChunk, TokenUsage,
};
use crate::config::Config;
use crate::constants::conversation::CASE_DESCRIPTION_SNIPPETS;
use crate::storage::{
    MessageAuthor, MessageMeta, ModerationMeta, NewMessage, SessionRecord, SharedDatabase,
    SnapshotCache, StoredMessage,
};
use crate::types::{
    ErrorPayload, FairError, Result, SessionId, UserIdentity, ValidationError, ValidationErrorKind,
    log_filter_warn,
};

/// Inbound chat message
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub message: String,
    pub session_id: Option<SessionId>,
    /// Existing case to attach when a new session is created
    pub case_id: Option<String>,
}

/// Conversation state after the pipeline ran, returned with every reply
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnMeta {
    pub session_id: SessionId,
    pub stage: ConversationStage,
    pub collected_info: CollectedInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_question: Option<FollowUpQuestion>,
    pub ambiguity: AmbiguityResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_creation: Option<CaseCreationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_id: Option<String>,
    pub language: Language,
}

/// Everything needed to finish a turn once the prompt is assembled
#[derive(Debug, Clone)]
pub struct PreparedTurn {
    pub meta: TurnMeta,
    message: String,
    input_verdict: ModerationVerdict,
    prompt: Vec<ChatMessage>,
}

impl PreparedTurn {
    pub fn session_id(&self) -> &SessionId {
        &self.meta.session_id
    }

    pub fn prompt(&self) -> &[ChatMessage] {
        &self.prompt
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyMeta {
    #[serde(flatten)]
    pub turn: TurnMeta,
    #[serde(flatten)]
    pub message: MessageMeta,
}

/// Batch-mode result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub session_id: SessionId,
    pub message_id: String,
    pub reply: String,
    pub meta: ReplyMeta,
}

impl TurnOutcome {
    pub fn form_suggestion(&self) -> Option<&FormSuggestion> {
        self.meta.message.form_suggestion.as_ref()
    }
}

/// Streaming-mode events, in emission order: `meta`, `delta`*,
/// `moderation_blocked`?, then `done` or `error`.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    Meta(TurnMeta),
    Delta(String),
    /// Streamed text was withheld; clients replace it with `replacement`.
    ModerationBlocked {
        categories: Vec<String>,
        replacement: String,
    },
    Error(ErrorPayload),
    Done {
        message_id: String,
        meta: MessageMeta,
    },
}

impl TurnEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Meta(_) => "meta",
            Self::Delta(_) => "delta",
            Self::ModerationBlocked { .. } => "moderation_blocked",
            Self::Error(_) => "error",
            Self::Done { .. } => "done",
        }
    }

    pub fn data(&self) -> serde_json::Value {
        use serde_json::json;

        match self {
            Self::Meta(meta) => serde_json::to_value(meta).unwrap_or_default(),
            Self::Delta(text) => json!({ "text": text }),
            Self::ModerationBlocked {
                categories,
                replacement,
            } => json!({ "categories": categories, "replacement": replacement }),
            Self::Error(payload) => json!({ "error": payload }),
            Self::Done { message_id, meta } => json!({ "messageId": message_id, "meta": meta }),
        }
    }
}

/// Raw model output plus call metadata, before output moderation
struct Generated {
    raw: String,
    usage: TokenUsage,
    model: String,
    latency_ms: u64,
    partial: bool,
}

/// Persisted reply, after output moderation
struct Finished {
    assistant: StoredMessage,
    output_verdict: ModerationVerdict,
}

pub struct TurnProcessor {
    provider: SharedProvider,
    moderator: SharedModerator,
    db: SharedDatabase,
    cache: Arc<SnapshotCache>,
    cases: Arc<dyn CaseManager>,
    options: CompletionOptions,
    history_window: usize,
    max_message_chars: usize,
    fallback_reply: String,
}

impl TurnProcessor {
    pub fn new(
        config: &Config,
        provider: SharedProvider,
        moderator: SharedModerator,
        db: SharedDatabase,
        cache: Arc<SnapshotCache>,
        cases: Arc<dyn CaseManager>,
    ) -> Self {
        Self {
            provider,
            moderator,
            db,
            cache,
            cases,
            options: CompletionOptions::from(&config.llm),
            history_window: config.conversation.history_window,
            max_message_chars: config.conversation.max_message_chars,
            fallback_reply: config.conversation.fallback_reply.clone(),
        }
    }

    pub fn db(&self) -> &SharedDatabase {
        &self.db
    }

    /// Load a session through the cache, enforcing ownership.
    pub fn load_session(&self, id: &SessionId, user_id: &str) -> Result<SessionRecord> {
        if let Some(session) = self.cache.get(id) {
            if session.user_id != user_id {
                return Err(FairError::SessionNotFound(id.to_string()));
            }
            return Ok(session);
        }
        let session = self.db.get_session_for_user(id, user_id)?;
        self.cache.insert(session.clone());
        Ok(session)
    }

    /// Archive a session owned by `user_id`. Later turns on it are rejected.
    pub fn archive_session(&self, id: &SessionId, user_id: &str) -> Result<()> {
        self.load_session(id, user_id)?;
        let result = self.db.archive_session(id);
        self.cache.invalidate(id);
        result?;
        info!(session_id = %id, "Archived conversation session");
        Ok(())
    }

    /// Run a whole turn in batch mode.
    pub async fn handle(&self, user: &UserIdentity, request: TurnRequest) -> Result<TurnOutcome> {
        let prepared = self.prepare(user, request).await?;
        self.complete(prepared).await
    }

    /// Everything up to and including prompt assembly.
    #[instrument(skip_all, fields(user_id = %user.user_id))]
    pub async fn prepare(&self, user: &UserIdentity, request: TurnRequest) -> Result<PreparedTurn> {
        let message = request.message.trim().to_string();
        self.validate_message(&message)?;

        // Blocked input never creates or touches a session.
        let input_verdict = self.moderator.moderate(&message).await?;
        if input_verdict.blocked {
            info!(categories = ?input_verdict.categories, "Input blocked by moderation");
            return Err(FairError::ContentBlocked {
                categories: input_verdict.categories,
            });
        }

        let mut session = match &request.session_id {
            Some(id) => self.load_session(id, &user.user_id)?,
            None => self.open_session(user, request.case_id.as_deref())?,
        };
        if session.archived {
            return Err(ValidationError::new(ValidationErrorKind::Range, "session is archived")
                .with_field("sessionId")
                .into());
        }

        let mut snapshot = session.context_snapshot.clone();
        let language = detect_language(&message, snapshot.language);
        snapshot.language = Some(language);

        let extracted = extractor::extract_with_expectation(&message, snapshot.last_question);
        let updated = snapshot.collected_info.merge(extracted);
        if !updated.is_empty() {
            debug!(fields = ?updated, "Collected new case details");
        }

        let previous_stage = snapshot.conversation_stage;
        let current_stage = stage::settle(
            previous_stage,
            &snapshot.collected_info,
            &message,
            !updated.is_empty(),
        );
        snapshot.conversation_stage = current_stage;
        if current_stage != previous_stage {
            info!(from = %previous_stage, to = %current_stage, "Conversation stage changed");
        }

        let next_question = followup::select_for_stage(
            current_stage,
            &snapshot.collected_info,
            &snapshot.asked_questions,
        );
        if let Some(question) = &next_question {
            snapshot.asked_questions.insert(question.key);
        }
        snapshot.last_question = next_question.as_ref().map(|q| q.key);

        let active_cases = log_filter_warn(
            self.cases.active_cases(&user.user_id).await,
            "Failed to load active cases",
        )
        .unwrap_or_default();
        let ambiguity = ambiguity::detect(
            &message,
            AmbiguityContext {
                active_cases: &active_cases,
                collected: &snapshot.collected_info,
            },
        );

        self.persist_snapshot(&mut session, snapshot)?;

        let case_creation = if current_stage == ConversationStage::PostCreateCoach
            && previous_stage != ConversationStage::PostCreateCoach
            && session.case_id.is_none()
        {
            Some(self.create_case(user, &mut session, &message).await?)
        } else {
            None
        };

        let history = self.history(&session.id)?;
        let snapshot = &session.context_snapshot;
        let input = PromptInput {
            stage: snapshot.conversation_stage,
            collected: &snapshot.collected_info,
            next_question: next_question.as_ref(),
            ambiguity: &ambiguity,
            case_creation: case_creation.as_ref(),
            language,
            history: &history,
            message: &message,
        };
        let prompt = prompt::assemble(&input);

        Ok(PreparedTurn {
            meta: TurnMeta {
                session_id: session.id.clone(),
                stage: snapshot.conversation_stage,
                collected_info: snapshot.collected_info.clone(),
                next_question,
                ambiguity,
                case_creation,
                case_id: session.case_id.clone(),
                language,
            },
            message,
            input_verdict,
            prompt,
        })
    }

    /// Finish a prepared turn with a single completion call.
    #[instrument(skip_all, fields(session_id = %prepared.meta.session_id))]
    pub async fn complete(&self, prepared: PreparedTurn) -> Result<TurnOutcome> {
        let start = Instant::now();
        let completion = self.provider.complete(&prepared.prompt, &self.options).await?;

        let generated = Generated {
            raw: completion.content,
            usage: completion.usage,
            model: completion.model,
            latency_ms: start.elapsed().as_millis() as u64,
            partial: false,
        };
        let finished = self.finish(&prepared, generated).await?;

        Ok(TurnOutcome {
            session_id: prepared.meta.session_id.clone(),
            message_id: finished.assistant.id,
            reply: finished.assistant.content,
            meta: ReplyMeta {
                turn: prepared.meta,
                message: finished.assistant.meta,
            },
        })
    }

    /// Finish a prepared turn by streaming deltas into `tx`.
    ///
    /// A failed send means the client went away: whatever was generated so
    /// far is moderated and persisted with `partial = true`.
    #[instrument(skip_all, fields(session_id = %prepared.meta.session_id))]
    pub async fn stream(&self, prepared: PreparedTurn, tx: mpsc::Sender<TurnEvent>) {
        let start = Instant::now();
        let mut generated = Generated {
            raw: String::new(),
            usage: TokenUsage::default(),
            model: self.options.model.clone(),
            latency_ms: 0,
            partial: false,
        };

        if tx.send(TurnEvent::Meta(prepared.meta.clone())).await.is_err() {
            debug!("Client disconnected before streaming started");
            self.persist_user_only(&prepared);
            return;
        }

        let mut chunks = match self.provider.complete_stream(&prepared.prompt, &self.options).await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(error = %e, "Failed to open completion stream");
                let _ = tx.send(TurnEvent::Error(ErrorPayload::from(&e))).await;
                return;
            }
        };

        let mut filter = ReplyStreamFilter::new();
        let mut disconnected = false;
        let mut stream_error = None;

        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(StreamChunk::Delta(delta)) => {
                    generated.raw.push_str(&delta);
                    let visible = filter.push(&delta);
                    if !visible.is_empty() && tx.send(TurnEvent::Delta(visible)).await.is_err() {
                        disconnected = true;
                        break;
                    }
                }
                Ok(StreamChunk::Usage(usage)) => generated.usage = usage,
                Err(e) => {
                    stream_error = Some(e);
                    break;
                }
            }
        }
        drop(chunks);
        generated.latency_ms = start.elapsed().as_millis() as u64;

        if !disconnected && stream_error.is_none() {
            let tail = filter.finish();
            if !tail.is_empty() && tx.send(TurnEvent::Delta(tail)).await.is_err() {
                disconnected = true;
            }
        }

        if disconnected || stream_error.is_some() {
            generated.partial = true;
            if generated.raw.trim().is_empty() {
                self.persist_user_only(&prepared);
            } else if let Err(e) = self.finish(&prepared, generated).await {
                warn!(error = %e, "Failed to persist partial reply");
            }

            match stream_error {
                Some(e) => {
                    warn!(error = %e, "Completion stream failed mid-reply");
                    let _ = tx.send(TurnEvent::Error(ErrorPayload::from(&e))).await;
                }
                None => info!("Client disconnected; partial reply persisted"),
            }
            return;
        }

        match self.finish(&prepared, generated).await {
            Ok(finished) => {
                if finished.output_verdict.blocked {
                    let _ = tx
                        .send(TurnEvent::ModerationBlocked {
                            categories: finished.output_verdict.categories.clone(),
                            replacement: finished.assistant.content.clone(),
                        })
                        .await;
                }
                let _ = tx
                    .send(TurnEvent::Done {
                        message_id: finished.assistant.id,
                        meta: finished.assistant.meta,
                    })
                    .await;
            }
            Err(e) => {
                let _ = tx.send(TurnEvent::Error(ErrorPayload::from(&e))).await;
            }
        }
    }

    // =========================================================================
    // Pipeline steps
    // =========================================================================

    fn validate_message(&self, message: &str) -> Result<()> {
        if message.is_empty() {
            return Err(ValidationError::missing("message").into());
        }
        let chars = message.chars().count();
        if chars > self.max_message_chars {
            return Err(ValidationError::new(
                ValidationErrorKind::Range,
                format!(
                    "message is {} characters; the limit is {}",
                    chars, self.max_message_chars
                ),
            )
            .with_field("message")
            .into());
        }
        Ok(())
    }

    fn open_session(&self, user: &UserIdentity, case_id: Option<&str>) -> Result<SessionRecord> {
        if let Some(case_id) = case_id {
            let owned = self
                .db
                .get_case(case_id)?
                .is_some_and(|case| case.user_id == user.user_id);
            if !owned {
                return Err(FairError::validation("caseId", "unknown case"));
            }
        }

        let session = self
            .db
            .create_session(&user.user_id, case_id, &ContextSnapshot::default())?;
        info!(session_id = %session.id, "Started conversation session");
        self.cache.insert(session.clone());
        Ok(session)
    }

    /// Write-through: the cache only ever holds what the database accepted.
    fn persist_snapshot(&self, session: &mut SessionRecord, snapshot: ContextSnapshot) -> Result<()> {
        match self.db.update_snapshot(&session.id, &snapshot) {
            Ok(()) => {
                session.context_snapshot = snapshot;
                self.cache.insert(session.clone());
                Ok(())
            }
            Err(e) => {
                self.cache.invalidate(&session.id);
                Err(e)
            }
        }
    }

    async fn create_case(
        &self,
        user: &UserIdentity,
        session: &mut SessionRecord,
        message: &str,
    ) -> Result<CaseCreationResult> {
        let mut user_messages = self
            .db
            .recent_user_messages(&session.id, CASE_DESCRIPTION_SNIPPETS)?;
        user_messages.push(message.to_string());

        let collected = session.context_snapshot.collected_info.clone();
        let result = bridge::create_from_conversation(
            self.cases.as_ref(),
            ConversationState {
                collected: &collected,
                user_messages: &user_messages,
            },
            &user.user_id,
            user.token(),
        )
        .await;

        match &result.case_id {
            Some(case_id) if result.success => {
                self.db.link_case(&session.id, case_id)?;
                session.case_id = Some(case_id.clone());
                self.cache.insert(session.clone());
            }
            _ => {
                // Let the user confirm again on the next turn.
                let mut snapshot = session.context_snapshot.clone();
                snapshot.conversation_stage = ConversationStage::ConfirmCreate;
                self.persist_snapshot(session, snapshot)?;
            }
        }

        Ok(result)
    }

    fn history(&self, session_id: &SessionId) -> Result<Vec<ChatMessage>> {
        let messages = self.db.recent_messages(session_id, self.history_window)?;
        Ok(messages
            .into_iter()
            .map(|m| match m.author {
                MessageAuthor::User => ChatMessage::user(m.content),
                MessageAuthor::Assistant => ChatMessage::assistant(m.content),
            })
            .collect())
    }

    /// Moderate the reply, strip the suggestion block and persist both
    /// sides of the exchange.
    async fn finish(&self, prepared: &PreparedTurn, generated: Generated) -> Result<Finished> {
        let output_verdict = self.moderator.moderate(&generated.raw).await?;

        let (content, form_suggestion) = if output_verdict.blocked {
            info!(categories = ?output_verdict.categories, "Reply replaced by moderation fallback");
            (self.fallback_reply.clone(), None)
        } else {
            let parsed = parse_reply(&generated.raw);
            (parsed.text, parsed.form_suggestion)
        };

        let total = generated.usage.total();
        let meta = MessageMeta {
            tokens: (total > 0).then_some(total),
            latency_ms: Some(generated.latency_ms),
            model: Some(generated.model),
            moderation: Some(ModerationMeta::from(&output_verdict)),
            partial: generated.partial,
            form_suggestion,
        };

        let stored = self.db.append_messages(
            &prepared.meta.session_id,
            &[
                self.user_message(prepared),
                NewMessage::assistant(content, meta),
            ],
        )?;
        self.cache.invalidate(&prepared.meta.session_id);

        let assistant = stored
            .into_iter()
            .nth(1)
            .ok_or_else(|| FairError::Storage("assistant message was not stored".to_string()))?;

        Ok(Finished {
            assistant,
            output_verdict,
        })
    }

    fn user_message(&self, prepared: &PreparedTurn) -> NewMessage {
        let mut message = NewMessage::user(prepared.message.clone());
        message.meta.moderation = Some(ModerationMeta::from(&prepared.input_verdict));
        message
    }

    fn persist_user_only(&self, prepared: &PreparedTurn) {
        let result = self
            .db
            .append_messages(&prepared.meta.session_id, &[self.user_message(prepared)]);
        self.cache.invalidate(&prepared.meta.session_id);
        log_filter_warn(result, "Failed to persist user message");
    }
}
