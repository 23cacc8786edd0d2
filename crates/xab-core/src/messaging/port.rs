use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::{MessagingCapabilities, Screen},
    Result,
};

/// Cross-messenger port.
///
/// The menu produces [`Screen`]s; adapters decide how keyboards and HTML map onto
/// their platform.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_screen(&self, chat_id: ChatId, screen: &Screen) -> Result<MessageRef>;
    async fn edit_screen(&self, msg: MessageRef, screen: &Screen) -> Result<()>;
    async fn send_photo(&self, chat_id: ChatId, png: &[u8], caption_html: &str)
        -> Result<MessageRef>;

    async fn answer_callback_query(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<()>;
}
