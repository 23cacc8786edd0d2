//! Host metrics and log access, behind a fixed set of named operations.
//!
//! Nothing here runs arbitrary shell: `/proc` is read directly, `vnstat` is the
//! only external binary, and log operations act on paths chosen by the caller
//! from configuration.

use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use tokio::process::Command;

use crate::{errors::Error, Result};

/// Bytes read from the end of a log file before splitting lines.
const TAIL_READ_BYTES: u64 = 64 * 1024;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MemoryUsage {
    pub used_mb: u64,
    pub total_mb: u64,
}

impl MemoryUsage {
    pub fn percent(&self) -> f64 {
        if self.total_mb == 0 {
            return 0.0;
        }
        self.used_mb as f64 * 100.0 / self.total_mb as f64
    }
}

/// Current-month interface traffic in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Traffic {
    pub rx: u64,
    pub tx: u64,
}

/// Host probe port. Metric getters are best-effort and return `None` when the
/// figure cannot be read.
#[async_trait]
pub trait SystemProbe: Send + Sync {
    async fn cpu_percent(&self) -> Option<f64>;
    async fn memory(&self) -> Option<MemoryUsage>;
    async fn load_average(&self) -> Option<String>;
    async fn uptime(&self) -> Option<String>;
    async fn monthly_traffic(&self) -> Option<Traffic>;

    /// Last `lines` lines of `path`, at most `max_chars` characters (the tail is kept).
    async fn tail_log(&self, path: &Path, lines: usize, max_chars: usize) -> Result<String>;

    /// Truncate `path` to zero length.
    async fn truncate_log(&self, path: &Path) -> Result<()>;
}

/// Linux implementation reading `/proc` and `vnstat`.
#[derive(Clone, Debug)]
pub struct HostProbe {
    proc_root: PathBuf,
    timeout: Duration,
}

impl HostProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            timeout,
        }
    }

    async fn read_proc(&self, name: &str) -> Option<String> {
        let path = self.proc_root.join(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "probe read failed");
                None
            }
        }
    }
}

#[async_trait]
impl SystemProbe for HostProbe {
    async fn cpu_percent(&self) -> Option<f64> {
        parse_cpu_percent(&self.read_proc("stat").await?)
    }

    async fn memory(&self) -> Option<MemoryUsage> {
        parse_meminfo(&self.read_proc("meminfo").await?)
    }

    async fn load_average(&self) -> Option<String> {
        parse_loadavg(&self.read_proc("loadavg").await?)
    }

    async fn uptime(&self) -> Option<String> {
        let raw = self.read_proc("uptime").await?;
        let secs = raw.split_whitespace().next()?.parse::<f64>().ok()?;
        Some(format_uptime(secs as u64))
    }

    async fn monthly_traffic(&self) -> Option<Traffic> {
        let mut cmd = Command::new("vnstat");
        cmd.args(["--json", "m", "1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let out = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(out)) if out.status.success() => out,
            Ok(Ok(out)) => {
                tracing::warn!(status = %out.status, "vnstat failed");
                return None;
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "vnstat not available");
                return None;
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "vnstat timed out");
                return None;
            }
        };

        parse_vnstat_month(&String::from_utf8_lossy(&out.stdout))
    }

    async fn tail_log(&self, path: &Path, lines: usize, max_chars: usize) -> Result<String> {
        let path = path.to_path_buf();
        let task = tokio::task::spawn_blocking(move || read_tail(&path, lines, max_chars));
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(res)) => res,
            Ok(Err(e)) => Err(Error::External(format!("log reader panicked: {e}"))),
            Err(_) => Err(Error::External("log read timed out".to_string())),
        }
    }

    async fn truncate_log(&self, path: &Path) -> Result<()> {
        let file = tokio::fs::OpenOptions::new().write(true).open(path).await?;
        file.set_len(0).await?;
        Ok(())
    }
}

fn read_tail(path: &Path, lines: usize, max_chars: usize) -> Result<String> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let start = len.saturating_sub(TAIL_READ_BYTES);
    file.seek(SeekFrom::Start(start))?;

    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    let text = String::from_utf8_lossy(&buf);

    // A partial first line from the seek is dropped.
    let body = if start > 0 {
        text.split_once('\n').map(|(_, rest)| rest).unwrap_or("")
    } else {
        &text[..]
    };

    Ok(tail_lines(body, lines, max_chars))
}

/// Last `lines` lines of `text`, clipped to the final `max_chars` characters.
pub fn tail_lines(text: &str, lines: usize, max_chars: usize) -> String {
    let all: Vec<&str> = text.trim_end_matches('\n').lines().collect();
    let start = all.len().saturating_sub(lines);
    let joined = all[start..].join("\n");

    let count = joined.chars().count();
    if count <= max_chars {
        return joined;
    }
    joined.chars().skip(count - max_chars).collect()
}

/// Busy share since boot from the aggregate `cpu` line: (user + system) / (user + system + idle).
pub fn parse_cpu_percent(stat: &str) -> Option<f64> {
    let line = stat.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(|f| f.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    let user = *fields.first()?;
    let system = *fields.get(2)?;
    let idle = *fields.get(3)?;

    let total = user + system + idle;
    if total == 0 {
        return Some(0.0);
    }
    Some((user + system) as f64 * 100.0 / total as f64)
}

/// Used = MemTotal - MemAvailable (what `free` reports as used).
pub fn parse_meminfo(meminfo: &str) -> Option<MemoryUsage> {
    let field = |name: &str| -> Option<u64> {
        let line = meminfo.lines().find(|l| l.starts_with(name))?;
        line[name.len()..]
            .trim_start_matches(':')
            .split_whitespace()
            .next()?
            .parse::<u64>()
            .ok()
    };

    let total_kb = field("MemTotal")?;
    let available_kb = field("MemAvailable")
        .or_else(|| Some(field("MemFree")? + field("Buffers")? + field("Cached")?))?;

    Some(MemoryUsage {
        used_mb: total_kb.saturating_sub(available_kb) / 1024,
        total_mb: total_kb / 1024,
    })
}

/// One-minute load average.
pub fn parse_loadavg(loadavg: &str) -> Option<String> {
    loadavg.split_whitespace().next().map(|s| s.to_string())
}

/// `uptime -p`-style text without the leading "up".
pub fn format_uptime(secs: u64) -> String {
    let weeks = secs / 604_800;
    let days = (secs % 604_800) / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;

    let unit = |n: u64, name: &str| {
        if n == 1 {
            format!("1 {name}")
        } else {
            format!("{n} {name}s")
        }
    };

    let mut parts = Vec::new();
    if weeks > 0 {
        parts.push(unit(weeks, "week"));
    }
    if days > 0 {
        parts.push(unit(days, "day"));
    }
    if hours > 0 {
        parts.push(unit(hours, "hour"));
    }
    if minutes > 0 || parts.is_empty() {
        parts.push(unit(minutes, "minute"));
    }
    parts.join(", ")
}

/// First interface, first month entry of `vnstat --json m 1`.
pub fn parse_vnstat_month(raw: &str) -> Option<Traffic> {
    let v: serde_json::Value = serde_json::from_str(raw).ok()?;
    let month = v
        .get("interfaces")?
        .get(0)?
        .get("traffic")?
        .get("month")?
        .get(0)?;
    Some(Traffic {
        rx: month.get("rx")?.as_u64()?,
        tx: month.get("tx")?.as_u64()?,
    })
}
