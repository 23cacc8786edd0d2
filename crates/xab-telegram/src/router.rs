use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use xab_core::{
    config::Config,
    domain::{ChatId, MessageRef},
    menu::{MenuDispatcher, Outgoing, Reply},
    messaging::port::MessagingPort,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub menu: Arc<MenuDispatcher>,
    pub messenger: Arc<dyn MessagingPort>,
}

pub async fn run_polling(cfg: Arc<Config>, menu: Arc<MenuDispatcher>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "xab started"),
        Err(e) => tracing::warn!(error = %e, "get_me failed; continuing"),
    }
    tracing::info!(
        config = %cfg.xray_config_path.display(),
        unit = %cfg.xray_service_unit,
        admins = cfg.admin_ids.len(),
        "serving xray admin menu"
    );

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let state = Arc::new(AppState {
        menu,
        messenger,
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}

/// Deliver the screens of a reply. `origin` is the message that carried the
/// pressed button; edits without one are posted as new messages.
pub async fn deliver(state: &AppState, chat_id: ChatId, origin: Option<MessageRef>, reply: &Reply) {
    let caps = state.messenger.capabilities();
    for out in &reply.outgoing {
        let (text, max_len) = match out {
            Outgoing::Edit(screen) | Outgoing::Send(screen) => (&screen.html, caps.max_message_len),
            Outgoing::Photo { caption, .. } => (caption, caps.max_caption_len),
        };
        let len = text.chars().count();
        if len > max_len {
            tracing::warn!(len, max_len, "outgoing text exceeds telegram limit");
        }

        let res = match (out, origin) {
            (Outgoing::Edit(screen), Some(msg)) => state.messenger.edit_screen(msg, screen).await,
            (Outgoing::Edit(screen), None) | (Outgoing::Send(screen), _) => state
                .messenger
                .send_screen(chat_id, screen)
                .await
                .map(|_| ()),
            (Outgoing::Photo { png, caption }, _) => state
                .messenger
                .send_photo(chat_id, png, caption)
                .await
                .map(|_| ()),
        };
        if let Err(e) = res {
            tracing::warn!(chat_id = chat_id.0, error = %e, "failed to deliver screen");
        }
    }
}
