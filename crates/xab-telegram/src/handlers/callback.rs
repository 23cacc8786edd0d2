use std::sync::Arc;

use teloxide::prelude::*;

use xab_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    menu::Request,
};

use crate::router::{deliver, AppState};

pub async fn handle_callback(
    _bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let caller = UserId(q.from.id.0 as i64);
    let data = q.data.clone().unwrap_or_default();
    let origin = q.message.as_ref().map(|m| MessageRef {
        chat_id: ChatId(m.chat.id.0),
        message_id: MessageId(m.id.0),
    });
    // Private chats share the user's id.
    let chat_id = origin.map(|m| m.chat_id).unwrap_or(ChatId(caller.0));

    let reply = state.menu.handle(caller, Request::Callback { data }).await;

    // Always answer callback query.
    let answer = reply.answer.clone().unwrap_or_default();
    if let Err(e) = state
        .messenger
        .answer_callback_query(&q.id, answer.text.as_deref(), answer.show_alert)
        .await
    {
        tracing::warn!(error = %e, "failed to answer callback query");
    }

    deliver(&state, chat_id, origin, &reply).await;

    if reply.terminate {
        tracing::info!(user_id = caller.0, "exiting for restart");
        std::process::exit(0);
    }

    Ok(())
}
