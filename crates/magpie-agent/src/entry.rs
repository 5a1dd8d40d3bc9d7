//! Conversation entry point — translates a mention/reply event into one
//! completed conversation turn.
//!
//! Steps: reject empty input → raise typing → build system prompt → fold
//! history through the assembler → resolve reply context (image or quoted
//! text) → persist the user turn → drive the tool loop → persist the
//! assistant turn → emit the answer with debug metadata → clear typing.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use magpie_core::config::{BotConfig, RoomSettings};
use magpie_store::{Role, TranscriptStore};

use crate::assemble::assemble;
use crate::chat::{ChatService, DebugPayload};
use crate::driver::{run_conversation, DriverConfig, DriverOutcome};
use crate::media::{fetch_reply_image, MediaError, IMAGE_TOO_LARGE_NOTE};
use crate::prompt::build_system_prompt;
use crate::provider::{AssembledMessage, CompletionService, ContentPart};
use crate::registry::{ToolContext, ToolRegistry};
use crate::typing::TypingHandle;

/// Chat-protocol event type identifying an image message.
const IMAGE_EVENT_TYPE: &str = "m.image";

/// A mention or reply event, normalised by the channel adapter.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub conversation_id: String,
    pub sender_id: String,
    /// Id of the triggering event, used for the read marker.
    pub event_id: String,
    pub body: String,
    /// Id of the replied-to event, when the trigger was a reply.
    pub reply_to: Option<String>,
}

pub struct ConversationEngine {
    chat: Arc<dyn ChatService>,
    service: Arc<dyn CompletionService>,
    registry: Arc<ToolRegistry>,
    store: Arc<TranscriptStore>,
    rooms: Arc<RoomSettings>,
    bot: BotConfig,
    /// Own user id: author of assistant/tool rows, subject of the
    /// display-name lookup.
    bot_id: String,
}

impl ConversationEngine {
    pub fn new(
        chat: Arc<dyn ChatService>,
        service: Arc<dyn CompletionService>,
        registry: Arc<ToolRegistry>,
        store: Arc<TranscriptStore>,
        rooms: Arc<RoomSettings>,
        bot: BotConfig,
        bot_id: impl Into<String>,
    ) -> Self {
        Self {
            chat,
            service,
            registry,
            store,
            rooms,
            bot,
            bot_id: bot_id.into(),
        }
    }

    /// Run one conversation turn to completion. Never returns an error; all
    /// failure paths end in a user-visible message or a logged no-op.
    pub async fn handle_message(&self, msg: IncomingMessage, cancel: CancellationToken) {
        if msg.body.trim().is_empty() {
            return;
        }

        let conv = msg.conversation_id.as_str();
        let room_cfg = self.rooms.for_room(conv);

        if let Err(e) = self.chat.mark_read(conv, &msg.event_id).await {
            debug!(conversation = conv, error = %e, "read marker failed");
        }

        let typing = TypingHandle::start(Arc::clone(&self.chat), conv);

        let display_name = match self.chat.display_name(&self.bot_id).await {
            Ok(Some(name)) => name,
            _ => self.bot.display_name.clone(),
        };
        let now_local = Utc::now().with_timezone(&self.bot.tz());
        let mut messages = vec![AssembledMessage::system(build_system_prompt(
            &display_name,
            now_local,
        ))];

        let history = match self.store.fetch_recent(conv, room_cfg.history_limit) {
            Ok(turns) => turns,
            Err(e) => {
                warn!(conversation = conv, error = %e, "history read failed, continuing without history");
                Vec::new()
            }
        };
        messages.extend(assemble(&history));

        let mut model = room_cfg.text_model.clone();
        let mut image_part: Option<ContentPart> = None;
        if let Some(reply_to) = &msg.reply_to {
            match self.reply_context(conv, reply_to, &room_cfg.image_model).await {
                ReplyContext::Image(part, image_model) => {
                    image_part = Some(part);
                    model = image_model;
                }
                ReplyContext::Note(note) => messages.push(AssembledMessage::system(note)),
            }
        }

        messages.push(match image_part {
            Some(part) => AssembledMessage::user_with_image(&msg.body, part),
            None => AssembledMessage::user(&msg.body),
        });
        let prompt_message_count = messages.len();

        // The user turn goes in before the model sees it; tool rows follow
        // incrementally from the driver.
        if let Err(e) = self
            .store
            .append_text(conv, Role::User, &msg.sender_id, &msg.body)
        {
            warn!(conversation = conv, error = %e, "user row write failed");
        }

        let ctx = ToolContext {
            conversation_id: msg.conversation_id.clone(),
            sender_id: msg.sender_id.clone(),
        };
        let driver_cfg = DriverConfig {
            model: model.clone(),
            max_iterations: room_cfg.max_tool_iterations,
        };
        let outcome = run_conversation(
            self.service.as_ref(),
            &self.registry,
            &self.store,
            &self.bot_id,
            &ctx,
            messages,
            &driver_cfg,
            &cancel,
        )
        .await;

        if let Err(e) = self
            .store
            .append_text(conv, Role::Assistant, &self.bot_id, &outcome.text)
        {
            warn!(conversation = conv, error = %e, "assistant row write failed");
        }

        let debug_payload = build_debug_payload(&model, prompt_message_count, &outcome);
        if let Err(e) = self
            .chat
            .send_markdown_with_debug(conv, &outcome.text, &debug_payload)
            .await
        {
            error!(conversation = conv, error = %e, "outbound send failed");
        }

        info!(
            conversation = conv,
            model = %model,
            iterations = outcome.iterations,
            tool_batches = outcome.tool_trace.len(),
            "conversation turn complete"
        );

        typing.stop().await;
    }

    /// Resolve the replied-to event into either an inline image (switching
    /// to the image model) or a system note. Failures never abort the turn.
    async fn reply_context(
        &self,
        conv: &str,
        reply_to: &str,
        image_model: &str,
    ) -> ReplyContext {
        let event_type = match self.chat.event_type(conv, reply_to).await {
            Ok(t) => t,
            Err(e) => {
                return ReplyContext::Note(format!(
                    "Note: the replied-to message could not be retrieved ({e})."
                ))
            }
        };

        if event_type == IMAGE_EVENT_TYPE {
            match fetch_reply_image(self.chat.as_ref(), conv, reply_to).await {
                Ok(part) => ReplyContext::Image(part, image_model.to_string()),
                Err(MediaError::TooLarge { size }) => {
                    warn!(conversation = conv, size, "reply image over the inline limit");
                    ReplyContext::Note(IMAGE_TOO_LARGE_NOTE.to_string())
                }
                Err(e) => ReplyContext::Note(format!(
                    "Note: the replied-to image could not be retrieved ({e})."
                )),
            }
        } else {
            match self.chat.event_text(conv, reply_to).await {
                Ok(quoted) => ReplyContext::Note(format!(
                    "The user is replying to this earlier message: \"{quoted}\""
                )),
                Err(e) => ReplyContext::Note(format!(
                    "Note: the replied-to message could not be retrieved ({e})."
                )),
            }
        }
    }
}

enum ReplyContext {
    Image(ContentPart, String),
    Note(String),
}

fn build_debug_payload(
    model: &str,
    prompt_message_count: usize,
    outcome: &DriverOutcome,
) -> DebugPayload {
    let mut debug = DebugPayload::new();
    debug.insert("model".into(), model.into());
    debug.insert(
        "prompt_message_count".into(),
        (prompt_message_count as u64).into(),
    );
    debug.insert(
        "tool_iterations".into(),
        (outcome.tool_trace.len() as u64).into(),
    );
    if !outcome.tool_trace.is_empty() {
        let iterations: Vec<serde_json::Value> = outcome
            .tool_trace
            .iter()
            .map(|batch| {
                batch
                    .iter()
                    .map(|call| {
                        serde_json::json!({
                            "tool": call.name,
                            "arguments": call.arguments,
                        })
                    })
                    .collect::<Vec<_>>()
                    .into()
            })
            .collect();
        debug.insert("tool_calls".into(), iterations.into());
    }
    debug
}
