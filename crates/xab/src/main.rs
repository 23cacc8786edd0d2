use std::sync::Arc;

use xab_core::{
    audit::AuditLogger,
    config::Config,
    inbound::{CredentialStore, DocumentAccessor},
    menu::MenuDispatcher,
    probe::HostProbe,
    service::{ServiceController, SystemdController},
};

#[tokio::main]
async fn main() -> Result<(), xab_core::Error> {
    xab_core::logging::init("xab")?;

    let cfg = Arc::new(Config::load()?);

    let service: Arc<dyn ServiceController> = Arc::new(SystemdController::new(
        cfg.xray_service_unit.clone(),
        cfg.service_timeout,
    ));
    let store = Arc::new(CredentialStore::new(
        DocumentAccessor::new(cfg.xray_config_path.clone()),
        service.clone(),
    ));
    let probe = Arc::new(HostProbe::new(cfg.probe_timeout));
    let audit = Arc::new(AuditLogger::new(
        cfg.audit_log_path.clone(),
        cfg.audit_log_json,
    ));

    let menu = Arc::new(MenuDispatcher::new(
        cfg.clone(),
        store,
        probe,
        service,
        audit,
    ));

    xab_telegram::router::run_polling(cfg, menu)
        .await
        .map_err(|e| xab_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
