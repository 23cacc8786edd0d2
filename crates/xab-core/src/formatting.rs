//! Formatting utilities (Telegram HTML, gauges, sizes, share links, QR codes).

use std::io::Cursor;

use image::{ImageFormat, Luma};
use qrcode::QrCode;

use crate::{config::Config, errors::Error, Result};

/// Telegram's limit for inline button callback data, in bytes.
pub const CALLBACK_DATA_MAX_BYTES: usize = 64;

/// Callback prefix of the per-account delete button.
pub const DELETE_SOCKS_PREFIX: &str = "del_s|";

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Fixed-width block gauge, e.g. `██░░░░░░` for 25%.
pub fn progress_bar(percent: f64, width: usize) -> String {
    let percent = if percent.is_finite() {
        percent.clamp(0.0, 100.0)
    } else {
        0.0
    };
    let filled = ((width as f64) * percent / 100.0) as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

/// Bytes to a one-decimal binary unit string (`1.5KB`, `3.0GB`, ...).
pub fn human_size(bytes: u64) -> String {
    let mut val = bytes as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if val < 1024.0 {
            return format!("{val:.1}{unit}");
        }
        val /= 1024.0;
    }
    format!("{val:.1}PB")
}

/// VLESS-over-WebSocket share link for one client.
pub fn vless_link(cfg: &Config, id: &str, label: &str) -> Result<String> {
    let domain = cfg
        .vless_domain
        .as_deref()
        .ok_or_else(|| Error::Config("VLESS_DOMAIN is not set".to_string()))?;
    let path = urlencoding::encode(&cfg.vless_ws_path);
    let label = urlencoding::encode(label);

    Ok(format!(
        "vless://{id}@{domain}:{port}?encryption=none&security=none&type=ws&host={domain}&path={path}#{label}",
        port = cfg.vless_port
    ))
}

/// Longest prefix of `s` that fits in `max_bytes` without splitting a char.
pub fn truncate_to_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Scannable PNG of `data`, at least 300px square.
pub fn qr_png(data: &str) -> Result<Vec<u8>> {
    let code = QrCode::new(data.as_bytes())
        .map_err(|e| Error::External(format!("qr encode failed: {e}")))?;
    let img = code
        .render::<Luma<u8>>()
        .min_dimensions(300, 300)
        .build();

    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .map_err(|e| Error::External(format!("qr png encode failed: {e}")))?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_html_escapes_specials() {
        assert_eq!(escape_html("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }

    #[test]
    fn progress_bar_clamps() {
        assert_eq!(progress_bar(0.0, 8), "░░░░░░░░");
        assert_eq!(progress_bar(50.0, 8), "████░░░░");
        assert_eq!(progress_bar(250.0, 8), "████████");
        assert_eq!(progress_bar(-3.0, 4), "░░░░");
        assert_eq!(progress_bar(f64::NAN, 4), "░░░░");
    }

    #[test]
    fn human_size_picks_unit() {
        assert_eq!(human_size(0), "0.0B");
        assert_eq!(human_size(1536), "1.5KB");
        assert_eq!(human_size(3 * 1024 * 1024 * 1024), "3.0GB");
    }

    #[test]
    fn vless_link_encodes_path_and_label() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::for_tests(dir.path(), 1);
        let link = vless_link(&cfg, "uuid-1", "bob phone").unwrap();
        assert_eq!(
            link,
            "vless://uuid-1@proxy.example.com:443?encryption=none&security=none&type=ws&host=proxy.example.com&path=%2Fws#bob%20phone"
        );
    }

    #[test]
    fn vless_link_requires_domain() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::for_tests(dir.path(), 1);
        cfg.vless_domain = None;
        assert!(matches!(vless_link(&cfg, "id", "x"), Err(Error::Config(_))));
    }

    #[test]
    fn truncate_to_bytes_respects_char_boundaries() {
        assert_eq!(truncate_to_bytes("abc", 10), "abc");
        assert_eq!(truncate_to_bytes("héllo", 2), "h");
        assert_eq!(truncate_to_bytes("héllo", 3), "hé");
    }

    #[test]
    fn qr_png_is_a_square_png() {
        let png = qr_png("vless://uuid-1@proxy.example.com:443?type=ws#bob").unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let img = image::load_from_memory_with_format(&png, ImageFormat::Png).unwrap();
        assert_eq!(img.width(), img.height());
        assert!(img.width() >= 300);
    }
}
