use std::sync::Arc;

use teloxide::prelude::*;

use xab_core::{
    domain::{ChatId, UserId},
    menu::Request,
};

use crate::router::{deliver, AppState};

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

fn to_request(text: &str) -> Request {
    let (name, rest) = parse_command(text);
    Request::Command {
        name,
        args: rest.split_whitespace().map(str::to_string).collect(),
    }
}

pub async fn handle_command(_bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let caller = UserId(user.id.0 as i64);
    let chat_id = ChatId(msg.chat.id.0);

    let request = to_request(text);
    if let Request::Command { name, .. } = &request {
        tracing::debug!(user_id = caller.0, command = %name, "command received");
    }

    let reply = state.menu.handle(caller, request).await;
    deliver(&state, chat_id, None, &reply).await;

    Ok(())
}
