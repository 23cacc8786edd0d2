use std::sync::Arc;

use crate::{
    errors::Error,
    formatting::{CALLBACK_DATA_MAX_BYTES, DELETE_SOCKS_PREFIX},
    inbound::{
        document::{SocksAccount, VlessClient},
        transaction::MutationTransaction,
        DocumentAccessor, PROTOCOL_SOCKS, PROTOCOL_VLESS,
    },
    service::ServiceController,
    Result,
};

/// SOCKS/VLESS credential operations over the Xray config file.
///
/// Reads go straight to disk; writes go through [`MutationTransaction`].
/// `DuplicateUser` / `UserNotFound` / `NotConfigured` are decided before any
/// write, so they never restart the proxy.
pub struct CredentialStore {
    tx: MutationTransaction,
}

/// Longest SOCKS user whose delete button still fits Telegram callback data.
pub const SOCKS_USER_MAX_BYTES: usize = CALLBACK_DATA_MAX_BYTES - DELETE_SOCKS_PREFIX.len();

impl CredentialStore {
    pub fn new(accessor: DocumentAccessor, service: Arc<dyn ServiceController>) -> Self {
        Self {
            tx: MutationTransaction::new(accessor, service),
        }
    }

    pub fn accessor(&self) -> &DocumentAccessor {
        self.tx.accessor()
    }

    /// SOCKS accounts in file order; empty when no socks inbound exists.
    pub fn list_socks(&self) -> Result<Vec<SocksAccount>> {
        let doc = self.accessor().load()?;
        match doc.find_inbound(PROTOCOL_SOCKS) {
            Some(inbound) => Ok(inbound.socks_settings()?.accounts),
            None => Ok(Vec::new()),
        }
    }

    /// Port of the socks inbound, for list headers.
    pub fn socks_port(&self) -> Result<Option<String>> {
        let doc = self.accessor().load()?;
        Ok(doc
            .find_inbound(PROTOCOL_SOCKS)
            .and_then(|inbound| inbound.port_label()))
    }

    pub async fn add_socks(&self, user: &str, pass: &str) -> Result<()> {
        if user.trim().is_empty() || pass.trim().is_empty() {
            return Err(Error::Argument(
                "user and password must be non-empty".to_string(),
            ));
        }
        if user.len() > SOCKS_USER_MAX_BYTES {
            return Err(Error::Argument(format!(
                "user name is too long (max {SOCKS_USER_MAX_BYTES} bytes)"
            )));
        }

        self.tx
            .execute("add_socks", |doc| {
                let inbound = doc
                    .find_inbound_mut(PROTOCOL_SOCKS)
                    .ok_or_else(|| not_configured(PROTOCOL_SOCKS))?;

                let mut settings = inbound.socks_settings()?;
                if settings.accounts.iter().any(|a| a.user == user) {
                    return Err(Error::DuplicateUser(user.to_string()));
                }

                settings.accounts.push(SocksAccount::new(user, pass));
                inbound.set_socks_settings(&settings)
            })
            .await?;

        tracing::info!(user, "socks account added");
        Ok(())
    }

    pub async fn remove_socks(&self, user: &str) -> Result<()> {
        self.tx
            .execute("remove_socks", |doc| {
                let inbound = doc
                    .find_inbound_mut(PROTOCOL_SOCKS)
                    .ok_or_else(|| not_configured(PROTOCOL_SOCKS))?;

                let mut settings = inbound.socks_settings()?;
                let before = settings.accounts.len();
                settings.accounts.retain(|a| a.user != user);
                if settings.accounts.len() == before {
                    return Err(Error::UserNotFound(user.to_string()));
                }

                inbound.set_socks_settings(&settings)
            })
            .await?;

        tracing::info!(user, "socks account removed");
        Ok(())
    }

    /// VLESS clients in file order; empty when no vless inbound exists.
    pub fn list_vless(&self) -> Result<Vec<VlessClient>> {
        let doc = self.accessor().load()?;
        match doc.find_inbound(PROTOCOL_VLESS) {
            Some(inbound) => Ok(inbound.vless_settings()?.clients),
            None => Ok(Vec::new()),
        }
    }
}

fn not_configured(protocol: &str) -> Error {
    Error::NotConfigured {
        protocol: protocol.to_string(),
    }
}
