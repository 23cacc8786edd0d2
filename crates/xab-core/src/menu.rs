//! Menu state machine: maps commands and callback tokens onto store/probe
//! operations and renders the outcome.
//!
//! The dispatcher owns no business rules. It authorizes, routes, and turns
//! every failure into a visible message; it never returns an error.

use std::{path::PathBuf, sync::Arc};

use chrono::Local;

use crate::{
    audit::{AuditEvent, AuditLogger},
    config::Config,
    domain::UserId,
    errors::Error,
    formatting::{
        escape_html, human_size, progress_bar, qr_png, truncate_to_bytes, vless_link,
        CALLBACK_DATA_MAX_BYTES, DELETE_SOCKS_PREFIX,
    },
    inbound::CredentialStore,
    messaging::types::{InlineButton, InlineKeyboard, Screen},
    probe::SystemProbe,
    security::is_authorized,
    service::ServiceController,
    Result,
};

const RULE: &str = "➖➖➖➖➖➖➖➖";

/// One logical request from the chat transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    /// `/name arg1 arg2 ...`
    Command { name: String, args: Vec<String> },
    /// Inline button token (`status`, `del_s|alice`, ...).
    Callback { data: String },
}

impl Request {
    pub fn command(name: &str, args: &[&str]) -> Self {
        Request::Command {
            name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn callback(data: &str) -> Self {
        Request::Callback {
            data: data.to_string(),
        }
    }

    /// Name used for audit/log lines; never includes arguments.
    fn action(&self) -> &str {
        match self {
            Request::Command { name, .. } => name,
            Request::Callback { data } => data.split('|').next().unwrap_or(data),
        }
    }
}

/// Answer to a button press (toast or modal alert).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallbackAnswer {
    pub text: Option<String>,
    pub show_alert: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outgoing {
    /// Replace the message that carried the pressed button.
    Edit(Screen),
    /// Post a new message in the chat.
    Send(Screen),
    /// Post a PNG image with an HTML caption.
    Photo { png: Vec<u8>, caption: String },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reply {
    pub answer: Option<CallbackAnswer>,
    pub outgoing: Vec<Outgoing>,
    /// Exit the process once the reply has been delivered.
    pub terminate: bool,
}

impl Reply {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn ack() -> Self {
        Self {
            answer: Some(CallbackAnswer::default()),
            ..Self::default()
        }
    }

    pub fn alert(text: impl Into<String>) -> Self {
        Self {
            answer: Some(CallbackAnswer {
                text: Some(text.into()),
                show_alert: true,
            }),
            ..Self::default()
        }
    }

    pub fn edit(screen: Screen) -> Self {
        Self::ack().then(Outgoing::Edit(screen))
    }

    pub fn send(screen: Screen) -> Self {
        Self::none().then(Outgoing::Send(screen))
    }

    pub fn then(mut self, out: Outgoing) -> Self {
        self.outgoing.push(out);
        self
    }
}

#[derive(Clone, Copy, Debug)]
enum LogKind {
    Error,
    Access,
}

/// Request router for the admin menu.
pub struct MenuDispatcher {
    cfg: Arc<Config>,
    store: Arc<CredentialStore>,
    probe: Arc<dyn SystemProbe>,
    service: Arc<dyn ServiceController>,
    audit: Arc<AuditLogger>,
}

impl MenuDispatcher {
    pub fn new(
        cfg: Arc<Config>,
        store: Arc<CredentialStore>,
        probe: Arc<dyn SystemProbe>,
        service: Arc<dyn ServiceController>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            cfg,
            store,
            probe,
            service,
            audit,
        }
    }

    /// Handle one request. Callbacks always come back with an answer.
    pub async fn handle(&self, caller: UserId, req: Request) -> Reply {
        if !is_authorized(Some(caller), &self.cfg.admin_ids) {
            tracing::warn!(user_id = caller.0, action = req.action(), "unauthorized request");
            self.audit.record(AuditEvent::denied(caller.0, req.action()));
            return match req {
                Request::Command { .. } => {
                    Reply::send(Screen::text("🚫 Unauthorized. Contact the bot owner for access."))
                }
                Request::Callback { .. } => Reply::alert("🚫 Permission denied"),
            };
        }

        match req {
            Request::Command { name, args } => self.handle_command(caller, &name, &args).await,
            Request::Callback { data } => {
                let mut reply = match self.handle_callback(caller, &data).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        tracing::error!(action = %data, error = %e, "callback failed");
                        Reply::alert(format!("❌ Error: {}", clip(&e.to_string(), 180)))
                    }
                };
                reply.answer.get_or_insert_with(CallbackAnswer::default);
                reply
            }
        }
    }

    async fn handle_command(&self, caller: UserId, name: &str, args: &[String]) -> Reply {
        match name {
            "start" => Reply::send(Screen::with_keyboard(
                "👋 <b>Hello, admin!</b>\nThis is your server control center.",
                root_keyboard(),
            )),
            "addsocks" => self.add_socks(caller, args).await,
            _ => {
                tracing::debug!(command = name, "ignoring unknown command");
                Reply::none()
            }
        }
    }

    async fn handle_callback(&self, caller: UserId, data: &str) -> Result<Reply> {
        match data {
            "back" => Ok(Reply::edit(Screen::with_keyboard(
                "🖥️ <b>Control panel</b>",
                root_keyboard(),
            ))),
            "status" => Ok(Reply::edit(self.render_status().await)),
            "users_socks" => Ok(Reply::edit(self.render_socks_list()?)),
            "users_vless" => Ok(Reply::edit(self.render_vless_list()?)),
            "logs_menu" => Ok(Reply::edit(logs_menu())),
            "v_err" => self.show_log(LogKind::Error).await,
            "v_acc" => self.show_log(LogKind::Access).await,
            "c_log" => Ok(self.clear_logs(caller).await),
            "sys" => Ok(Reply::edit(maintenance_menu())),
            "rx" => self.restart_service(caller),
            "rb" => {
                self.audit
                    .record(AuditEvent::maintenance(caller.0, "restart_bot", None));
                tracing::info!(user_id = caller.0, "bot restart requested");
                Ok(Reply {
                    terminate: true,
                    ..Reply::alert("♻️ Bot is restarting...")
                })
            }
            "nop" => Ok(Reply::ack()),
            _ => {
                if let Some(user) = data.strip_prefix(DELETE_SOCKS_PREFIX) {
                    return self.delete_socks(caller, user).await;
                }
                if let Some(rest) = data.strip_prefix("qr|") {
                    return self.share_vless(rest);
                }
                tracing::debug!(data, "ignoring unknown callback");
                Ok(Reply::ack())
            }
        }
    }

    async fn add_socks(&self, caller: UserId, args: &[String]) -> Reply {
        let [user, pass, ..] = args else {
            return Reply::send(Screen::text(
                "💡 <b>Format error</b>\nUsage: <code>/addsocks user password</code>",
            ));
        };

        let outcome = self.store.add_socks(user, pass).await;
        self.audit
            .record(AuditEvent::mutation(caller.0, "add_socks", user, &outcome));

        let html = match outcome {
            Ok(()) => format!(
                "✅ <b>SOCKS5 account added</b>\nUser: <code>{}</code>\nPassword: <code>{}</code>",
                escape_html(user),
                escape_html(pass)
            ),
            Err(e) => {
                if !e.is_user_facing() {
                    tracing::error!(error = %e, "add_socks failed");
                }
                format!("❌ <b>Add failed</b>\n{}", escape_html(&describe(&e)))
            }
        };
        Reply::send(Screen::text(html))
    }

    async fn delete_socks(&self, caller: UserId, user: &str) -> Result<Reply> {
        let outcome = self.store.remove_socks(user).await;
        self.audit
            .record(AuditEvent::mutation(caller.0, "remove_socks", user, &outcome));

        match outcome {
            Ok(()) => {
                let mut reply = Reply::alert(format!("✅ User {user} removed"));
                match self.render_socks_list() {
                    Ok(screen) => reply.outgoing.push(Outgoing::Edit(screen)),
                    Err(e) => tracing::warn!(error = %e, "failed to refresh socks list"),
                }
                Ok(reply)
            }
            Err(e) if e.is_user_facing() => Ok(Reply::alert(format!("❌ {}", describe(&e)))),
            Err(e) => Err(e),
        }
    }

    fn share_vless(&self, rest: &str) -> Result<Reply> {
        let (id, label) = match rest.split_once('|') {
            Some((id, label)) if !label.is_empty() => (id, label.to_string()),
            Some((id, _)) => (id, self.vless_label(id)),
            None => (rest, self.vless_label(rest)),
        };
        if id.is_empty() {
            return Ok(Reply::alert("❌ Missing client id"));
        }

        let link = vless_link(&self.cfg, id, &label)?;
        let caption = format!(
            "👤 <b>User</b>: <code>{}</code>\n🔗 <b>Link</b>: <code>{}</code>",
            escape_html(&label),
            escape_html(&link)
        );
        let out = match qr_png(&link) {
            Ok(png) => Outgoing::Photo { png, caption },
            Err(e) => {
                tracing::warn!(error = %e, "qr render failed; sending link only");
                Outgoing::Send(Screen::text(caption))
            }
        };
        Ok(Reply::ack().then(out))
    }

    fn vless_label(&self, id: &str) -> String {
        self.store
            .list_vless()
            .ok()
            .and_then(|clients| clients.into_iter().find(|c| c.id == id))
            .map(|c| c.label().to_string())
            .unwrap_or_else(|| crate::inbound::document::UNKNOWN_CLIENT_LABEL.to_string())
    }

    async fn show_log(&self, kind: LogKind) -> Result<Reply> {
        let (title, path) = match kind {
            LogKind::Error => ("❌ Xray error log", &self.cfg.xray_error_log),
            LogKind::Access => ("🌐 Xray access log", &self.cfg.xray_access_log),
        };
        let lines = self.cfg.log_tail_lines;
        let tail = self
            .probe
            .tail_log(path, lines, self.cfg.log_max_chars)
            .await?;
        let body = if tail.trim().is_empty() {
            "(empty)".to_string()
        } else {
            escape_html(&tail)
        };

        let html = format!("📜 <b>{title} (last {lines} lines)</b>\n<pre>{body}</pre>");
        Ok(Reply::ack().then(Outgoing::Send(Screen::text(html))))
    }

    async fn clear_logs(&self, caller: UserId) -> Reply {
        let paths: [&PathBuf; 2] = [&self.cfg.xray_error_log, &self.cfg.xray_access_log];
        let mut failures = Vec::new();
        for path in paths {
            if let Err(e) = self.probe.truncate_log(path).await {
                tracing::warn!(path = %path.display(), error = %e, "failed to truncate log");
                failures.push(format!("{}: {e}", path.display()));
            }
        }

        let error = (!failures.is_empty()).then(|| failures.join("; "));
        self.audit.record(AuditEvent::maintenance(
            caller.0,
            "clear_logs",
            error.as_deref(),
        ));

        match error {
            None => Reply::alert("✅ All logs cleared"),
            Some(e) => Reply::alert(format!("⚠️ Some logs were not cleared: {}", clip(&e, 150))),
        }
    }

    fn restart_service(&self, caller: UserId) -> Result<Reply> {
        let outcome = self.service.signal_reload();
        let err = outcome.as_ref().err().map(|e| e.to_string());
        self.audit.record(AuditEvent::maintenance(
            caller.0,
            "restart_service",
            err.as_deref(),
        ));
        outcome?;
        Ok(Reply::alert("✅ Xray restart requested"))
    }

    async fn render_status(&self) -> Screen {
        let (cpu, mem, load, uptime, traffic) = tokio::join!(
            self.probe.cpu_percent(),
            self.probe.memory(),
            self.probe.load_average(),
            self.probe.uptime(),
            self.probe.monthly_traffic(),
        );

        let cpu_line = match cpu {
            Some(pct) => format!("{} <code>{pct:.1}%</code>", progress_bar(pct, 8)),
            None => format!("{} <code>N/A</code>", progress_bar(0.0, 8)),
        };
        let mem_line = match mem {
            Some(m) => format!(
                "{} <code>{}/{}MB</code>",
                progress_bar(m.percent(), 8),
                m.used_mb,
                m.total_mb
            ),
            None => format!("{} <code>N/A</code>", progress_bar(0.0, 8)),
        };
        let traffic_line = match traffic {
            Some(t) => format!(
                "{} (⬇️{} ⬆️{})",
                human_size(t.rx.saturating_add(t.tx)),
                human_size(t.rx),
                human_size(t.tx)
            ),
            None => "⏳ waiting for vnstat...".to_string(),
        };

        let html = format!(
            "📊 <b>Server status</b>\n{RULE}\n\
💻 CPU : {cpu_line}\n\
🧠 Mem : {mem_line}\n\
⚖️ Load: <code>{}</code>\n\
⏱️ Up  : <code>{}</code>\n\
🌐 Traffic: <code>{}</code>\n{RULE}\n\
🕒 {}",
            escape_html(load.as_deref().unwrap_or("N/A")),
            escape_html(uptime.as_deref().unwrap_or("N/A")),
            escape_html(&traffic_line),
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );

        Screen::with_keyboard(html, root_keyboard())
    }

    /// SOCKS account list with per-account delete buttons.
    ///
    /// Shared by the list callback and the refresh after a delete.
    pub fn render_socks_list(&self) -> Result<Screen> {
        let accounts = self.store.list_socks()?;
        let port = self.store.socks_port()?;

        let mut html = match port {
            Some(p) => format!("👻 <b>SOCKS5 accounts (port {})</b>", escape_html(&p)),
            None => "👻 <b>SOCKS5 accounts</b>".to_string(),
        };
        if accounts.is_empty() {
            html.push_str("\n\nNo accounts yet.");
        }

        let mut kb = InlineKeyboard::default();
        for a in &accounts {
            let del = InlineButton::checked("🗑️ Delete", format!("{DELETE_SOCKS_PREFIX}{}", a.user))
                .unwrap_or_else(|| InlineButton::new("🗑️ Name too long", "nop"));
            kb = kb.row(vec![
                InlineButton::new(format!("👤 {} | 🔑 {}", a.user, a.pass), "nop"),
                del,
            ]);
        }
        let kb = kb
            .row(vec![InlineButton::new(
                "➕ Add account (/addsocks user pass)",
                "nop",
            )])
            .row(back_row());

        Ok(Screen::with_keyboard(html, kb))
    }

    fn render_vless_list(&self) -> Result<Screen> {
        let clients = self.store.list_vless()?;

        let mut html = "👥 <b>VLESS users</b>".to_string();
        if clients.is_empty() {
            html.push_str("\n\nNo clients configured.");
        }

        let mut kb = InlineKeyboard::default();
        for c in &clients {
            let mut row = vec![InlineButton::new(format!("👤 {}", c.label()), "nop")];
            if let Some(token) = qr_token(&c.id, c.label()) {
                row.push(InlineButton::new("📱 Share", token));
            }
            kb = kb.row(row);
        }

        Ok(Screen::with_keyboard(html, kb.row(back_row())))
    }
}

/// `qr|<id>|<label>`, with the label shortened (or dropped) to fit callback data.
fn qr_token(id: &str, label: &str) -> Option<String> {
    let base = format!("qr|{id}");
    if base.len() > CALLBACK_DATA_MAX_BYTES {
        return None;
    }
    let room = CALLBACK_DATA_MAX_BYTES - base.len();
    if room < 2 {
        return Some(base);
    }
    Some(format!("{base}|{}", truncate_to_bytes(label, room - 1)))
}

fn describe(e: &Error) -> String {
    match e {
        Error::DuplicateUser(u) => format!("User {u} already exists"),
        Error::UserNotFound(u) => format!("User {u} not found"),
        Error::NotConfigured { protocol } => format!("No {protocol} inbound is configured"),
        Error::Argument(msg) => msg.clone(),
        other => format!("Config file could not be updated: {other}"),
    }
}

fn clip(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    format!("{}...", s.chars().take(max_chars).collect::<String>())
}

fn back_row() -> Vec<InlineButton> {
    vec![InlineButton::new("🔙 Back to main menu", "back")]
}

pub fn root_keyboard() -> InlineKeyboard {
    InlineKeyboard::default()
        .row(vec![InlineButton::new("📊 System status", "status")])
        .row(vec![
            InlineButton::new("👥 VLESS users", "users_vless"),
            InlineButton::new("👻 SOCKS5 accounts", "users_socks"),
        ])
        .row(vec![
            InlineButton::new("📜 Logs", "logs_menu"),
            InlineButton::new("🛠️ Maintenance", "sys"),
        ])
}

fn logs_menu() -> Screen {
    Screen::with_keyboard(
        "📜 <b>Logs &amp; diagnostics</b>",
        InlineKeyboard::default()
            .row(vec![InlineButton::new("❌ Error log", "v_err")])
            .row(vec![InlineButton::new("🌐 Access log", "v_acc")])
            .row(vec![InlineButton::new("🧹 Clear all logs", "c_log")])
            .row(back_row()),
    )
}

fn maintenance_menu() -> Screen {
    Screen::with_keyboard(
        "🛠️ <b>Maintenance</b>",
        InlineKeyboard::default()
            .row(vec![InlineButton::new("♻️ Restart Xray", "rx")])
            .row(vec![InlineButton::new("♻️ Restart bot", "rb")])
            .row(back_row()),
    )
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::{json, Value};

    use super::*;
    use crate::{
        inbound::DocumentAccessor, probe::testing::FakeProbe, service::testing::FakeController,
    };

    const ADMIN: UserId = UserId(42);
    const STRANGER: UserId = UserId(7);

    struct Fixture {
        _dir: tempfile::TempDir,
        cfg: Arc<Config>,
        menu: MenuDispatcher,
        service: Arc<FakeController>,
        probe: Arc<FakeProbe>,
    }

    impl Fixture {
        fn config_json(&self) -> Value {
            serde_json::from_str(&fs::read_to_string(&self.cfg.xray_config_path).unwrap())
                .unwrap()
        }

        fn config_bytes(&self) -> Vec<u8> {
            fs::read(&self.cfg.xray_config_path).unwrap()
        }

        fn audit_lines(&self) -> Vec<Value> {
            fs::read_to_string(&self.cfg.audit_log_path)
                .unwrap_or_default()
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        }
    }

    fn fixture(doc: Option<Value>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::for_tests(dir.path(), ADMIN.0);
        cfg.audit_log_json = true;
        if let Some(doc) = doc {
            fs::write(
                &cfg.xray_config_path,
                serde_json::to_string_pretty(&doc).unwrap(),
            )
            .unwrap();
        }
        let cfg = Arc::new(cfg);

        let service = Arc::new(FakeController::default());
        let probe = Arc::new(FakeProbe::default());
        let store = Arc::new(CredentialStore::new(
            DocumentAccessor::new(cfg.xray_config_path.clone()),
            service.clone(),
        ));
        let audit = Arc::new(AuditLogger::new(
            cfg.audit_log_path.clone(),
            cfg.audit_log_json,
        ));
        let menu = MenuDispatcher::new(cfg.clone(), store, probe.clone(), service.clone(), audit);

        Fixture {
            _dir: dir,
            cfg,
            menu,
            service,
            probe,
        }
    }

    fn sample() -> Value {
        json!({
            "inbounds": [
                { "port": 16111, "protocol": "socks",
                  "settings": { "auth": "password", "accounts": [ { "user": "a", "pass": "1" } ] } },
                { "port": 443, "protocol": "vless",
                  "settings": { "clients": [ { "id": "uuid-1", "email": "alice" } ], "decryption": "none" } }
            ]
        })
    }

    fn sent_html(reply: &Reply) -> Vec<&str> {
        reply
            .outgoing
            .iter()
            .filter_map(|o| match o {
                Outgoing::Send(s) => Some(s.html.as_str()),
                Outgoing::Edit(_) | Outgoing::Photo { .. } => None,
            })
            .collect()
    }

    fn edited(reply: &Reply) -> &Screen {
        match reply.outgoing.as_slice() {
            [Outgoing::Edit(s)] => s,
            other => panic!("expected a single edit, got {other:?}"),
        }
    }

    fn alert_text(reply: &Reply) -> &str {
        reply
            .answer
            .as_ref()
            .and_then(|a| a.text.as_deref())
            .unwrap_or("")
    }

    #[tokio::test]
    async fn strangers_cannot_mutate_anything() {
        let fx = fixture(Some(sample()));
        let before = fx.config_bytes();

        let r1 = fx
            .menu
            .handle(STRANGER, Request::command("addsocks", &["x", "y"]))
            .await;
        let r2 = fx.menu.handle(STRANGER, Request::callback("del_s|a")).await;
        let r3 = fx.menu.handle(STRANGER, Request::callback("rx")).await;

        assert!(sent_html(&r1)[0].contains("Unauthorized"));
        assert_eq!(alert_text(&r2), "🚫 Permission denied");
        assert!(!r3.terminate);
        assert_eq!(fx.config_bytes(), before);
        assert_eq!(fx.service.calls(), 0);

        let audit = fx.audit_lines();
        assert_eq!(audit.len(), 3);
        assert!(audit.iter().all(|e| e["authorized"] == false));
        assert_eq!(audit[1]["action"], "del_s");
    }

    #[tokio::test]
    async fn start_shows_root_menu() {
        let fx = fixture(Some(sample()));
        let reply = fx.menu.handle(ADMIN, Request::command("start", &[])).await;
        match reply.outgoing.as_slice() {
            [Outgoing::Send(screen)] => {
                assert_eq!(screen.keyboard.as_ref(), Some(&root_keyboard()));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(reply.answer.is_none());
    }

    #[tokio::test]
    async fn addsocks_with_one_argument_is_a_format_error() {
        let fx = fixture(Some(sample()));
        let before = fx.config_bytes();

        let reply = fx
            .menu
            .handle(ADMIN, Request::command("addsocks", &["only"]))
            .await;

        assert!(sent_html(&reply)[0].contains("Format error"));
        assert_eq!(fx.config_bytes(), before);
    }

    #[tokio::test]
    async fn addsocks_appends_and_reloads_once() {
        let fx = fixture(Some(sample()));

        let reply = fx
            .menu
            .handle(ADMIN, Request::command("addsocks", &["b", "2"]))
            .await;

        assert!(sent_html(&reply)[0].contains("SOCKS5 account added"));
        assert_eq!(
            fx.config_json()["inbounds"][0]["settings"]["accounts"],
            json!([ { "user": "a", "pass": "1" }, { "user": "b", "pass": "2" } ])
        );
        assert_eq!(fx.service.calls(), 1);
    }

    #[tokio::test]
    async fn addsocks_duplicate_is_reported() {
        let fx = fixture(Some(sample()));
        let reply = fx
            .menu
            .handle(ADMIN, Request::command("addsocks", &["a", "9"]))
            .await;
        assert!(sent_html(&reply)[0].contains("User a already exists"));
        assert_eq!(fx.service.calls(), 0);
    }

    #[tokio::test]
    async fn delete_refreshes_the_socks_list() {
        let fx = fixture(Some(sample()));
        fx.menu
            .handle(ADMIN, Request::command("addsocks", &["b", "2"]))
            .await;

        let reply = fx.menu.handle(ADMIN, Request::callback("del_s|a")).await;

        assert_eq!(alert_text(&reply), "✅ User a removed");
        let screen = edited(&reply);
        assert!(screen.html.contains("port 16111"));
        let tokens: Vec<&str> = screen
            .keyboard
            .as_ref()
            .unwrap()
            .buttons()
            .map(|b| b.callback_data.as_str())
            .collect();
        assert!(tokens.contains(&"del_s|b"));
        assert!(!tokens.contains(&"del_s|a"));
        assert_eq!(fx.service.calls(), 2);
    }

    #[tokio::test]
    async fn delete_of_unknown_user_is_not_found_without_reload() {
        let fx = fixture(Some(sample()));
        let before = fx.config_bytes();

        let reply = fx.menu.handle(ADMIN, Request::callback("del_s|ghost")).await;

        assert_eq!(alert_text(&reply), "❌ User ghost not found");
        assert!(reply.outgoing.is_empty());
        assert_eq!(fx.config_bytes(), before);
        assert_eq!(fx.service.calls(), 0);
    }

    #[tokio::test]
    async fn unknown_and_nop_callbacks_are_acknowledged_only() {
        let fx = fixture(Some(sample()));
        for data in ["nop", "definitely-not-a-route", ""] {
            let reply = fx.menu.handle(ADMIN, Request::callback(data)).await;
            assert_eq!(reply, Reply::ack(), "callback {data:?}");
        }
    }

    #[tokio::test]
    async fn unknown_command_is_ignored() {
        let fx = fixture(Some(sample()));
        let reply = fx.menu.handle(ADMIN, Request::command("weather", &[])).await;
        assert_eq!(reply, Reply::none());
    }

    #[tokio::test]
    async fn missing_config_file_surfaces_a_generic_error() {
        let fx = fixture(None);
        let reply = fx.menu.handle(ADMIN, Request::callback("users_socks")).await;
        assert!(alert_text(&reply).starts_with("❌ Error:"));
        assert!(reply.outgoing.is_empty());
    }

    #[tokio::test]
    async fn socks_list_without_inbound_is_empty() {
        let fx = fixture(Some(json!({ "inbounds": [] })));
        let reply = fx.menu.handle(ADMIN, Request::callback("users_socks")).await;
        assert!(edited(&reply).html.contains("No accounts yet."));
    }

    #[tokio::test]
    async fn vless_list_tokens_fit_callback_budget() {
        let long_label = "someone-with-a-very-long-email-address@example.org";
        let fx = fixture(Some(json!({ "inbounds": [ { "protocol": "vless", "settings": { "clients": [
            { "id": "0f5e1f2a-7a36-4d7b-9a53-6f2d7f5b1c11", "email": long_label },
            { "id": "0f5e1f2a-7a36-4d7b-9a53-6f2d7f5b1c12" }
        ] } } ] })));

        let reply = fx.menu.handle(ADMIN, Request::callback("users_vless")).await;
        let kb = edited(&reply).keyboard.clone().unwrap();
        let qr: Vec<&str> = kb
            .buttons()
            .map(|b| b.callback_data.as_str())
            .filter(|d| d.starts_with("qr|"))
            .collect();

        assert_eq!(qr.len(), 2);
        assert!(qr.iter().all(|d| d.len() <= CALLBACK_DATA_MAX_BYTES));
        assert_eq!(qr[1], "qr|0f5e1f2a-7a36-4d7b-9a53-6f2d7f5b1c12|unknown");
    }

    #[tokio::test]
    async fn qr_sends_code_image_with_link_caption() {
        let fx = fixture(Some(sample()));

        let reply = fx.menu.handle(ADMIN, Request::callback("qr|uuid-1")).await;

        let [Outgoing::Photo { png, caption }] = reply.outgoing.as_slice() else {
            panic!("expected a photo, got {:?}", reply.outgoing);
        };
        assert_eq!(&png[..4], b"\x89PNG");
        assert!(caption.contains("<code>alice</code>"));
        assert!(caption.contains("vless://uuid-1@proxy.example.com:443?"));
        assert!(caption.contains("#alice"));
        assert_eq!(reply.answer, Some(CallbackAnswer::default()));
    }

    #[tokio::test]
    async fn addsocks_rejects_names_that_cannot_be_deleted() {
        let fx = fixture(Some(sample()));
        let before = fx.config_bytes();
        let long_user = "x".repeat(CALLBACK_DATA_MAX_BYTES - DELETE_SOCKS_PREFIX.len() + 1);

        let reply = fx
            .menu
            .handle(ADMIN, Request::command("addsocks", &[long_user.as_str(), "pw"]))
            .await;

        let html = sent_html(&reply);
        assert!(html[0].contains("Add failed"));
        assert!(html[0].contains("too long"));
        assert_eq!(fx.config_bytes(), before);
        assert_eq!(fx.service.calls(), 0);

        let list = fx.menu.handle(ADMIN, Request::callback("users_socks")).await;
        let kb = edited(&list).keyboard.clone().unwrap();
        assert!(kb
            .buttons()
            .filter(|b| b.label.starts_with("🗑️"))
            .all(|b| b.callback_data.starts_with(DELETE_SOCKS_PREFIX)));
    }

    #[tokio::test]
    async fn status_renders_probe_figures() {
        let fx = fixture(Some(sample()));
        let reply = fx.menu.handle(ADMIN, Request::callback("status")).await;
        let html = &edited(&reply).html;
        assert!(html.contains("<code>12.5%</code>"));
        assert!(html.contains("<code>512/1024MB</code>"));
        assert!(html.contains("<code>0.42</code>"));
        assert!(html.contains("waiting for vnstat"));
    }

    #[tokio::test]
    async fn error_log_is_escaped_and_tailed() {
        let fx = fixture(Some(sample()));
        fx.probe.logs.lock().unwrap().insert(
            fx.cfg.xray_error_log.clone(),
            "old\n<b>rejected</b> & dropped\n".to_string(),
        );

        let reply = fx.menu.handle(ADMIN, Request::callback("v_err")).await;

        let html = sent_html(&reply);
        assert!(html[0].contains("&lt;b&gt;rejected&lt;/b&gt; &amp; dropped"));
        assert!(html[0].starts_with("📜 <b>❌ Xray error log (last 20 lines)</b>"));
    }

    #[tokio::test]
    async fn clear_logs_truncates_both_files() {
        let fx = fixture(Some(sample()));
        let reply = fx.menu.handle(ADMIN, Request::callback("c_log")).await;

        assert_eq!(alert_text(&reply), "✅ All logs cleared");
        assert_eq!(
            *fx.probe.truncated.lock().unwrap(),
            vec![fx.cfg.xray_error_log.clone(), fx.cfg.xray_access_log.clone()]
        );
    }

    #[tokio::test]
    async fn restart_xray_signals_reload() {
        let fx = fixture(Some(sample()));
        let reply = fx.menu.handle(ADMIN, Request::callback("rx")).await;
        assert_eq!(alert_text(&reply), "✅ Xray restart requested");
        assert_eq!(fx.service.calls(), 1);
    }

    #[tokio::test]
    async fn restart_bot_requests_termination() {
        let fx = fixture(Some(sample()));
        let reply = fx.menu.handle(ADMIN, Request::callback("rb")).await;
        assert!(reply.terminate);
        assert!(alert_text(&reply).contains("restarting"));
    }

    #[tokio::test]
    async fn back_returns_to_root() {
        let fx = fixture(Some(sample()));
        let reply = fx.menu.handle(ADMIN, Request::callback("back")).await;
        assert_eq!(edited(&reply).keyboard.as_ref(), Some(&root_keyboard()));
    }

    #[test]
    fn qr_token_truncates_label_on_char_boundary() {
        let id = "0f5e1f2a-7a36-4d7b-9a53-6f2d7f5b1c11";
        let token = qr_token(id, "ééééééééééééééééééééééééééééé").unwrap();
        assert!(token.len() <= CALLBACK_DATA_MAX_BYTES);
        assert!(token.starts_with(&format!("qr|{id}|é")));
        assert!(qr_token(&"x".repeat(70), "a").is_none());
    }
}
