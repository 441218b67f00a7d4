//! Telegram channel publisher
//!
//! Publishes items to a Telegram channel through the Bot API: items with
//! media go out as `sendPhoto` with a caption, text-only items as
//! `sendMessage`.

use crate::config::TelegramConfig;
use crate::publish::{PublishError, Publisher, PublishResult};
use crate::storage::ItemRecord;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

/// Publisher backed by the Telegram Bot API
pub struct TelegramPublisher {
    client: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramPublisher {
    pub fn new(client: Client, config: &TelegramConfig) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    /// Builds the HTML caption: linked title plus the description
    fn caption(item: &ItemRecord) -> String {
        let mut caption = format!(
            r#"<a href="{}">{}</a>"#,
            item.source_url,
            html_escape(&item.title)
        );
        if !item.description.is_empty() {
            caption.push_str("\n\n");
            caption.push_str(&html_escape(&item.description));
        }
        caption
    }

    async fn send(&self, method: &str, payload: serde_json::Value) -> PublishResult<()> {
        let response = self
            .client
            .post(self.endpoint(method))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Publisher for TelegramPublisher {
    async fn publish(&self, item: &ItemRecord) -> PublishResult<()> {
        let caption = Self::caption(item);

        // The Bot API fetches photo URLs itself, so we hand it the source
        // media URL rather than uploading the local artifact.
        match item.media_urls.first() {
            Some(photo_url) => {
                self.send(
                    "sendPhoto",
                    json!({
                        "chat_id": self.chat_id,
                        "photo": photo_url,
                        "caption": caption,
                        "parse_mode": "HTML",
                    }),
                )
                .await
            }
            None => {
                self.send(
                    "sendMessage",
                    json!({
                        "chat_id": self.chat_id,
                        "text": caption,
                        "parse_mode": "HTML",
                    }),
                )
                .await
            }
        }
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
