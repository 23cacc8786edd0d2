//! Telegram adapter (teloxide).
//!
//! This crate implements the `xab-core` MessagingPort over Telegram Bot API
//! and feeds updates into the menu dispatcher.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode},
    ApiError, RequestError,
};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use xab_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, MessagingCapabilities, Screen},
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn markup(keyboard: &InlineKeyboard) -> InlineKeyboardMarkup {
        let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.callback_data.clone()))
                    .collect()
            })
            .collect();
        InlineKeyboardMarkup::new(rows)
    }

    fn map_err(e: RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        self.with_retry_raw(op).await.map_err(Self::map_err)
    }

    async fn with_retry_raw<T, Fut>(
        &self,
        mut op: impl FnMut() -> Fut,
    ) -> std::result::Result<T, RequestError>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Err(RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    tracing::debug!(retry_after = ?d, "telegram rate limited; retrying");
                    sleep(d).await;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: 4096,
            max_caption_len: 1024,
        }
    }

    async fn send_screen(&self, chat_id: ChatId, screen: &Screen) -> Result<MessageRef> {
        let markup = screen.keyboard.as_ref().map(Self::markup);
        let msg = self
            .with_retry(|| {
                let mut req = self
                    .bot
                    .send_message(Self::tg_chat(chat_id), screen.html.clone())
                    .parse_mode(ParseMode::Html)
                    .disable_web_page_preview(true);
                if let Some(m) = &markup {
                    req = req.reply_markup(m.clone());
                }
                req
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn edit_screen(&self, msg: MessageRef, screen: &Screen) -> Result<()> {
        let markup = screen.keyboard.as_ref().map(Self::markup);
        let res = self
            .with_retry_raw(|| {
                let mut req = self
                    .bot
                    .edit_message_text(
                        Self::tg_chat(msg.chat_id),
                        Self::tg_msg_id(msg.message_id),
                        screen.html.clone(),
                    )
                    .parse_mode(ParseMode::Html)
                    .disable_web_page_preview(true);
                if let Some(m) = &markup {
                    req = req.reply_markup(m.clone());
                }
                req
            })
            .await;

        match res {
            Ok(_) => Ok(()),
            // Pressing the same menu button twice renders identical content.
            Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(()),
            Err(e) => Err(Self::map_err(e)),
        }
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        png: &[u8],
        caption_html: &str,
    ) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_photo(
                        Self::tg_chat(chat_id),
                        InputFile::memory(png.to_vec()).file_name("qr.png"),
                    )
                    .caption(caption_html.to_string())
                    .parse_mode(ParseMode::Html)
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn answer_callback_query(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<()> {
        self.with_retry(|| {
            let mut req = self.bot.answer_callback_query(callback_id.to_string());
            if let Some(t) = text {
                req = req.text(t.to_string()).show_alert(show_alert);
            }
            req
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xab_core::messaging::types::InlineButton;

    #[test]
    fn markup_keeps_row_layout() {
        let kb = InlineKeyboard::default()
            .row(vec![InlineButton::new("a", "1"), InlineButton::new("b", "2")])
            .row(vec![InlineButton::new("c", "3")]);

        let markup = TelegramMessenger::markup(&kb);

        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[0].len(), 2);
        assert_eq!(markup.inline_keyboard[1][0].text, "c");
    }
}
