//! Chat transport
//!
//! The relay only needs four chat operations. They sit behind
//! [`ChatTransport`] so the lifecycle can run against a fake chat in tests.

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId, ParseMode, ReplyParameters};
use tracing::debug;

/// A video to send back to the originating chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoUpload {
    /// Destination chat
    pub chat_id: i64,
    /// Message the video answers
    pub reply_to: i32,
    /// File on local disk
    pub path: PathBuf,
    /// Caption, already HTML-escaped
    pub caption: String,
}

/// Chat operations used by the relay
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Sends a plain text message and returns its id.
    async fn send_text(&self, chat_id: i64, reply_to: Option<i32>, text: &str) -> Result<i32>;

    /// Replaces the text of an existing message.
    async fn edit_text(&self, chat_id: i64, message_id: i32, text: &str) -> Result<()>;

    /// Deletes a message.
    async fn delete(&self, chat_id: i64, message_id: i32) -> Result<()>;

    /// Uploads a video with an HTML caption.
    async fn send_video(&self, upload: VideoUpload) -> Result<()>;
}

/// Replies still go through if the user deleted their message meanwhile
fn reply_to(message_id: i32) -> ReplyParameters {
    ReplyParameters {
        allow_sending_without_reply: Some(true),
        ..ReplyParameters::new(MessageId(message_id))
    }
}

/// Telegram Bot API transport
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    /// Wraps a bot whose HTTP client already carries the upload timeout
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_text(&self, chat_id: i64, reply: Option<i32>, text: &str) -> Result<i32> {
        let mut req = self.bot.send_message(ChatId(chat_id), text);
        if let Some(id) = reply {
            req = req.reply_parameters(reply_to(id));
        }
        let msg = req.await?;
        Ok(msg.id.0)
    }

    async fn edit_text(&self, chat_id: i64, message_id: i32, text: &str) -> Result<()> {
        self.bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id), text)
            .await?;
        Ok(())
    }

    async fn delete(&self, chat_id: i64, message_id: i32) -> Result<()> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await?;
        Ok(())
    }

    async fn send_video(&self, upload: VideoUpload) -> Result<()> {
        debug!(chat_id = upload.chat_id, path = %upload.path.display(), "Sending video");
        self.bot
            .send_video(ChatId(upload.chat_id), InputFile::file(upload.path))
            .caption(upload.caption)
            .parse_mode(ParseMode::Html)
            .supports_streaming(true)
            .reply_parameters(reply_to(upload.reply_to))
            .await?;
        Ok(())
    }
}
