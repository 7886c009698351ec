use crate::bot::transport::ChatTransport;
use crate::bot::views::{DefaultRelayView, RelayView};
use crate::config::Settings;
use crate::downloader::ExtractionPool;
use crate::relay::url::find_url;
use crate::relay::{IncomingMessage, Outcome, Relay};
use anyhow::Result;
use std::sync::Arc;
use teloxide::{prelude::*, types::MessageEntityKind, utils::command::BotCommands};
use tracing::{debug, info, warn};

/// Safe extraction of user ID from a message.
/// Returns 0 if the user information is missing.
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Supported commands for the bot
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Show usage
    #[command(description = "Start the bot.")]
    Start,
    /// Check bot health
    #[command(description = "Check bot health.")]
    Healthcheck,
}

/// Telegram marks bare domains as links too; the extractor needs a scheme.
fn with_scheme(link: &str) -> String {
    if link.contains("://") {
        link.to_string()
    } else {
        format!("https://{link}")
    }
}

/// Builds the relay's view of a Telegram message.
///
/// Text messages and media captions are both accepted. Returns `None` for
/// messages without any text.
#[must_use]
pub fn incoming_from_message(msg: &Message) -> Option<IncomingMessage> {
    let text = msg.text().or_else(|| msg.caption())?;
    let entities = msg
        .parse_entities()
        .or_else(|| msg.parse_caption_entities())
        .unwrap_or_default();

    let links = entities
        .iter()
        .filter_map(|entity| match entity.kind() {
            MessageEntityKind::Url => Some(with_scheme(entity.text())),
            MessageEntityKind::TextLink { url } => Some(url.to_string()),
            _ => None,
        })
        .collect();

    Some(IncomingMessage {
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
        text: text.to_string(),
        links,
    })
}

/// Start command handler
///
/// # Errors
///
/// Returns an error if the usage text cannot be sent.
pub async fn start(bot: Bot, msg: Message, settings: Arc<Settings>) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    info!("User {user_id} initiated /start command.");
    bot.send_message(
        msg.chat.id,
        DefaultRelayView::welcome_message(settings.max_file_size_bytes()),
    )
    .await?;
    Ok(())
}

/// Healthcheck handler: reports whether the extraction tool runs
///
/// # Errors
///
/// Returns an error if the response cannot be sent.
pub async fn healthcheck(bot: Bot, msg: Message, pool: ExtractionPool) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    info!("Healthcheck command received from user {user_id}.");

    let text = match pool.version().await {
        Ok(version) => DefaultRelayView::healthcheck(Ok(version.as_str())),
        Err(e) => {
            warn!(error = %e, "Extraction tool health check failed");
            DefaultRelayView::healthcheck(Err(e.to_string().as_str()))
        }
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// Text handler: relays the first link in the message
///
/// # Errors
///
/// Never fails in practice; every relay failure is reported to the chat by
/// the relay itself.
pub async fn handle_text(msg: Message, relay: Arc<Relay>) -> Result<()> {
    let Some(incoming) = incoming_from_message(&msg) else {
        return Ok(());
    };
    let user_id = get_user_id_safe(&msg);

    match relay.handle(&incoming).await {
        Outcome::Ignored => debug!(user_id, "Message without link ignored"),
        Outcome::Delivered(delivered) => {
            info!(user_id, url = %delivered.url, title = %delivered.title, "Relay finished");
        }
        Outcome::Failed(err) => info!(user_id, error = %err, "Relay stopped"),
    }
    Ok(())
}

/// Access denied reply for users outside the allow-list
///
/// Only messages that would have started a download get the reply; other
/// chatter from these users stays unanswered, as it would for anyone.
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn handle_unauthorized(transport: &dyn ChatTransport, msg: &Message) -> Result<()> {
    let user_id = get_user_id_safe(msg);
    let Some(incoming) = incoming_from_message(msg) else {
        return Ok(());
    };
    if find_url(&incoming.text, &incoming.links).is_none() {
        debug!(user_id, "Message from unauthorized user without link ignored");
        return Ok(());
    }

    info!("⛔️ Unauthorized access from user {user_id}.");
    transport
        .send_text(
            incoming.chat_id,
            Some(incoming.message_id),
            DefaultRelayView::access_denied(),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::transport::MockChatTransport;
    use serde_json::json;

    fn message(value: serde_json::Value) -> Message {
        serde_json::from_value(value).expect("valid message json")
    }

    fn base(extra: serde_json::Value) -> serde_json::Value {
        let mut value = json!({
            "message_id": 11,
            "date": 1_700_000_000,
            "chat": {"id": 7, "type": "private", "first_name": "Ann"},
            "from": {"id": 42, "is_bot": false, "first_name": "Ann"}
        });
        if let (Some(target), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
            target.extend(extra.clone());
        }
        value
    }

    #[test]
    fn test_incoming_from_text_with_entities() {
        let msg = message(base(json!({
            "text": "see example.com/v/1 and this",
            "entities": [
                {"type": "url", "offset": 4, "length": 15},
                {"type": "text_link", "offset": 24, "length": 4, "url": "https://youtu.be/abc"}
            ]
        })));

        let incoming = incoming_from_message(&msg).expect("text message");
        assert_eq!(incoming.chat_id, 7);
        assert_eq!(incoming.message_id, 11);
        assert_eq!(
            incoming.links,
            vec![
                "https://example.com/v/1".to_string(),
                "https://youtu.be/abc".to_string()
            ]
        );
        assert_eq!(get_user_id_safe(&msg), 42);
    }

    #[test]
    fn test_incoming_from_caption() {
        let msg = message(base(json!({
            "caption": "https://example.com/v/2",
            "caption_entities": [{"type": "url", "offset": 0, "length": 23}],
            "photo": [{"file_id": "a", "file_unique_id": "b", "width": 1, "height": 1}]
        })));

        let incoming = incoming_from_message(&msg).expect("caption");
        assert_eq!(incoming.text, "https://example.com/v/2");
        assert_eq!(incoming.links, vec!["https://example.com/v/2".to_string()]);
    }

    #[test]
    fn test_plain_text_without_entities() {
        let msg = message(base(json!({"text": "hello"})));
        let incoming = incoming_from_message(&msg).expect("text");
        assert!(incoming.links.is_empty());
    }

    #[test]
    fn test_with_scheme() {
        assert_eq!(with_scheme("example.com/x"), "https://example.com/x");
        assert_eq!(with_scheme("http://example.com/x"), "http://example.com/x");
    }

    #[test]
    fn test_command_parsing() {
        assert!(matches!(
            Command::parse("/start", "clip_bot"),
            Ok(Command::Start)
        ));
        assert!(matches!(
            Command::parse("/healthcheck", "clip_bot"),
            Ok(Command::Healthcheck)
        ));
        assert!(Command::parse("/download", "clip_bot").is_err());
    }

    #[tokio::test]
    async fn test_unauthorized_chatter_gets_no_reply() {
        let mut transport = MockChatTransport::new();
        transport.expect_send_text().never();

        for msg in [
            message(base(json!({"text": "hello everyone"}))),
            message(base(json!({"location": {"latitude": 52.5, "longitude": 13.4}}))),
        ] {
            handle_unauthorized(&transport, &msg)
                .await
                .expect("nothing to send");
        }
    }

    #[tokio::test]
    async fn test_unauthorized_link_is_denied() {
        let mut transport = MockChatTransport::new();
        transport
            .expect_send_text()
            .withf(|chat, reply, text| *chat == 7 && *reply == Some(11) && text == "⛔️ Access denied")
            .times(1)
            .returning(|_, _, _| Ok(100));

        let msg = message(base(json!({"text": "grab https://example.com/v/1 please"})));
        handle_unauthorized(&transport, &msg)
            .await
            .expect("denial sent");
    }
}
