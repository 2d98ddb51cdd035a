//! Outbound messaging: the `Messenger` seam and its teloxide implementation.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode, ReplyParameters};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    /// Telegram HTML; callers escape user-provided parts.
    Html,
}

/// Anything that can deliver a text message to a chat.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send `text` to `chat_id`, optionally as a reply. Returns the sent message id.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        format: TextFormat,
        reply_to_message_id: Option<i64>,
    ) -> Result<i64, String>;
}

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        format: TextFormat,
        reply_to_message_id: Option<i64>,
    ) -> Result<i64, String> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);

        if format == TextFormat::Html {
            request = request.parse_mode(ParseMode::Html);
        }

        if let Some(msg_id) = reply_to_message_id {
            let reply_params = ReplyParameters::new(MessageId(msg_id as i32));
            request = request.reply_parameters(reply_params);
        }

        request.await.map(|msg| msg.id.0 as i64).map_err(|e| {
            let msg = format!("Failed to send: {e}");
            warn!("{}", msg);
            msg
        })
    }
}
