//! Typing indicator held for the duration of one conversation turn.
//!
//! The signal is raised with a 60 s timeout and refreshed every 30 s, so a
//! crashed task can never leave it stuck. `stop()` clears it explicitly.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::chat::ChatService;

/// How long the chat service keeps the signal up without a refresh.
pub const TYPING_TIMEOUT: Duration = Duration::from_secs(60);
const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Handle to a background typing-indicator task.
///
/// Call `stop()` once the response is out; dropping the handle aborts the
/// refresh loop and the timeout clears the signal server-side.
pub struct TypingHandle {
    task: tokio::task::JoinHandle<()>,
    chat: Arc<dyn ChatService>,
    conversation_id: String,
}

impl TypingHandle {
    /// Raise the signal immediately, then refresh until stopped.
    pub fn start(chat: Arc<dyn ChatService>, conversation_id: &str) -> Self {
        let conv = conversation_id.to_string();
        let chat2 = Arc::clone(&chat);
        let task = tokio::spawn(async move {
            loop {
                if let Err(e) = chat2.set_typing(&conv, true, TYPING_TIMEOUT).await {
                    debug!(conversation = %conv, error = %e, "typing signal failed");
                }
                tokio::time::sleep(REFRESH_INTERVAL).await;
            }
        });
        Self {
            task,
            chat,
            conversation_id: conversation_id.to_string(),
        }
    }

    /// Abort the refresh loop and clear the signal.
    pub async fn stop(self) {
        self.task.abort();
        let _ = self
            .chat
            .set_typing(&self.conversation_id, false, Duration::ZERO)
            .await;
    }
}

impl Drop for TypingHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
