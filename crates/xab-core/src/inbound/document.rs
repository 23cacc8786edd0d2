use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{errors::Error, Result};

/// The shared Xray config file.
///
/// Only `inbounds` is modeled; every other top-level key is carried in `extra`
/// and written back untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inbounds: Option<Vec<InboundDefinition>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of `inbounds`.
///
/// `settings` stays raw until a typed view is requested, so inbounds of
/// protocols we do not understand survive verbatim.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SocksSettings {
    #[serde(default)]
    pub accounts: Vec<SocksAccount>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocksAccount {
    pub user: String,
    pub pass: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SocksAccount {
    pub fn new(user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            pass: pass.into(),
            extra: Map::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VlessSettings {
    #[serde(default)]
    pub clients: Vec<VlessClient>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VlessClient {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Shown when a VLESS client has no `email`.
pub const UNKNOWN_CLIENT_LABEL: &str = "unknown";

impl VlessClient {
    pub fn label(&self) -> &str {
        match self.email.as_deref() {
            Some(email) if !email.trim().is_empty() => email,
            _ => UNKNOWN_CLIENT_LABEL,
        }
    }
}

impl ConfigDocument {
    /// First inbound whose `protocol` equals `protocol`.
    pub fn find_inbound(&self, protocol: &str) -> Option<&InboundDefinition> {
        self.inbounds
            .as_deref()?
            .iter()
            .find(|i| i.protocol.as_deref() == Some(protocol))
    }

    pub fn find_inbound_mut(&mut self, protocol: &str) -> Option<&mut InboundDefinition> {
        self.inbounds
            .as_deref_mut()?
            .iter_mut()
            .find(|i| i.protocol.as_deref() == Some(protocol))
    }
}

impl InboundDefinition {
    pub fn socks_settings(&self) -> Result<SocksSettings> {
        self.view("socks")
    }

    pub fn set_socks_settings(&mut self, settings: &SocksSettings) -> Result<()> {
        self.settings = Some(serde_json::to_value(settings)?);
        Ok(())
    }

    pub fn vless_settings(&self) -> Result<VlessSettings> {
        self.view("vless")
    }

    /// The inbound's `port` for display (Xray allows a number or a range string).
    pub fn port_label(&self) -> Option<String> {
        match self.extra.get("port")? {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    fn view<T: DeserializeOwned + Default>(&self, protocol: &str) -> Result<T> {
        match &self.settings {
            None | Some(Value::Null) => Ok(T::default()),
            Some(v) => serde_json::from_value(v.clone()).map_err(|e| Error::InvalidInbound {
                protocol: protocol.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Reads and writes the config file at a fixed path.
///
/// Nothing is cached: every call goes to disk so the file stays the single
/// source of truth.
#[derive(Clone, Debug)]
pub struct DocumentAccessor {
    path: PathBuf,
}

impl DocumentAccessor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<ConfigDocument> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::DocumentMissing {
                    path: self.path.clone(),
                })
            }
            Err(e) => return Err(Error::Io(e)),
        };

        serde_json::from_str(&raw).map_err(|source| Error::DocumentParse {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the file with `doc`. Readers see either the old or the new
    /// content, never a partial write.
    pub fn save(&self, doc: &ConfigDocument) -> Result<()> {
        let mut buf = serde_json::to_string_pretty(doc)?;
        buf.push('\n');
        write_atomic(&self.path, buf.as_bytes()).map_err(|source| Error::Persist {
            path: self.path.clone(),
            source,
        })
    }
}

/// Free-function form of [`ConfigDocument::find_inbound`].
pub fn find_inbound<'a>(doc: &'a ConfigDocument, protocol: &str) -> Option<&'a InboundDefinition> {
    doc.find_inbound(protocol)
}

/// Temp file in the target's directory, fsync, then rename over the target.
///
/// A symlinked target is resolved first so the link survives and the file it
/// points at is replaced. Mode is copied; owner and group are copied when the
/// process may chown (root), otherwise the new file belongs to the bot user.
fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let resolved = match fs::canonicalize(path) {
        Ok(p) => p,
        Err(e) if e.kind() == io::ErrorKind::NotFound => path.to_path_buf(),
        Err(e) => return Err(e),
    };
    let path = resolved.as_path();

    let dir = path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("config.json");
    let tmp = dir.join(format!(
        ".{file_name}.tmp-{}-{}",
        std::process::id(),
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ));

    let written = (|| {
        let mut f = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&tmp)?;
        f.write_all(data)?;
        f.sync_all()?;
        drop(f);

        // Keep the original mode; Xray may run as a different user.
        if let Ok(meta) = fs::metadata(path) {
            fs::set_permissions(&tmp, meta.permissions())?;
            copy_owner(&tmp, &meta);
        }

        fs::rename(&tmp, path)
    })();

    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written
}

#[cfg(unix)]
fn copy_owner(tmp: &Path, meta: &fs::Metadata) {
    use std::os::unix::fs::MetadataExt;

    if let Err(e) = std::os::unix::fs::chown(tmp, Some(meta.uid()), Some(meta.gid())) {
        tracing::debug!(error = %e, "could not keep config owner");
    }
}

#[cfg(not(unix))]
fn copy_owner(_tmp: &Path, _meta: &fs::Metadata) {}
