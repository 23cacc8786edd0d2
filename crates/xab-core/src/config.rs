use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Typed configuration, built once at startup and shared as `Arc<Config>`.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub admin_ids: Vec<i64>,

    // Xray
    pub xray_config_path: PathBuf,
    pub xray_service_unit: String,
    pub xray_error_log: PathBuf,
    pub xray_access_log: PathBuf,

    // VLESS share links
    pub vless_domain: Option<String>,
    pub vless_port: u16,
    pub vless_ws_path: String,

    // Log viewer limits
    pub log_tail_lines: usize,
    pub log_max_chars: usize,

    // External process timeouts
    pub probe_timeout: Duration,
    pub service_timeout: Duration,

    // Audit
    pub audit_log_path: PathBuf,
    pub audit_log_json: bool,
}

impl Config {
    /// Load from the process environment (plus `.env` in the working directory).
    ///
    /// `.env` entries are consulted after the real environment and are never
    /// written back into it.
    pub fn load() -> Result<Self> {
        let dotenv = read_dotenv(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok().or_else(|| dotenv.get(key).cloned()))
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let admin_ids = parse_csv_i64(get("TELEGRAM_ADMIN_IDS"));
        if admin_ids.is_empty() {
            return Err(Error::Config(
                "TELEGRAM_ADMIN_IDS environment variable is required".to_string(),
            ));
        }

        let path_or = |key: &str, default: &str| {
            PathBuf::from(get(key).and_then(non_empty).unwrap_or(default.to_string()))
        };

        let xray_config_path = path_or("XRAY_CONFIG_PATH", "/usr/local/etc/xray/config.json");
        let xray_service_unit = get("XRAY_SERVICE_UNIT")
            .and_then(non_empty)
            .unwrap_or("xray".to_string());
        let xray_error_log = path_or("XRAY_ERROR_LOG", "/var/log/xray/error.log");
        let xray_access_log = path_or("XRAY_ACCESS_LOG", "/var/log/xray/access.log");

        let vless_domain = get("VLESS_DOMAIN").and_then(non_empty);
        let vless_port = match get("VLESS_PORT").and_then(non_empty) {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("VLESS_PORT is not a valid port: {raw}")))?,
            None => 443,
        };
        let vless_ws_path = get("VLESS_WS_PATH")
            .and_then(non_empty)
            .unwrap_or("/".to_string());

        let log_tail_lines = parse_num(get("LOG_TAIL_LINES")).unwrap_or(20).max(1);
        let log_max_chars = parse_num(get("LOG_MAX_CHARS")).unwrap_or(4000).max(100);

        let probe_timeout = Duration::from_millis(parse_num(get("PROBE_TIMEOUT_MS")).unwrap_or(5_000));
        let service_timeout =
            Duration::from_millis(parse_num(get("SERVICE_TIMEOUT_MS")).unwrap_or(15_000));

        let audit_log_path = path_or("AUDIT_LOG_PATH", "/tmp/xab-audit.log");
        let audit_log_json = get("AUDIT_LOG_JSON").map(|s| parse_bool(&s)).unwrap_or(false);

        Ok(Self {
            telegram_bot_token,
            admin_ids,
            xray_config_path,
            xray_service_unit,
            xray_error_log,
            xray_access_log,
            vless_domain,
            vless_port,
            vless_ws_path,
            log_tail_lines,
            log_max_chars,
            probe_timeout,
            service_timeout,
            audit_log_path,
            audit_log_json,
        })
    }

    #[cfg(test)]
    pub(crate) fn for_tests(dir: &Path, admin: i64) -> Self {
        let dir = dir.to_path_buf();
        Self::from_lookup(move |key| match key {
            "TELEGRAM_BOT_TOKEN" => Some("test-token".to_string()),
            "TELEGRAM_ADMIN_IDS" => Some(admin.to_string()),
            "XRAY_CONFIG_PATH" => Some(dir.join("config.json").display().to_string()),
            "XRAY_ERROR_LOG" => Some(dir.join("error.log").display().to_string()),
            "XRAY_ACCESS_LOG" => Some(dir.join("access.log").display().to_string()),
            "AUDIT_LOG_PATH" => Some(dir.join("audit.log").display().to_string()),
            "VLESS_DOMAIN" => Some("proxy.example.com".to_string()),
            "VLESS_WS_PATH" => Some("/ws".to_string()),
            _ => None,
        })
        .expect("test config")
    }
}

fn read_dotenv(path: &Path) -> HashMap<String, String> {
    fs::read_to_string(path)
        .map(|contents| parse_dotenv(&contents))
        .unwrap_or_default()
}

fn parse_dotenv(contents: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = &val[1..val.len() - 1];
        }

        vars.insert(key.to_string(), val.to_string());
    }
    vars
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_num<T: std::str::FromStr>(v: Option<String>) -> Option<T> {
    v.and_then(|s| s.trim().parse::<T>().ok())
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
