use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    inbound::document::{ConfigDocument, DocumentAccessor},
    service::ServiceController,
    Result,
};

/// Validate → apply → persist → reload, one mutation at a time.
///
/// The lock spans the whole load/mutate/save sequence so two concurrent
/// requests cannot both load the same snapshot and overwrite each other.
pub struct MutationTransaction {
    accessor: DocumentAccessor,
    service: Arc<dyn ServiceController>,
    lock: Mutex<()>,
}

impl MutationTransaction {
    pub fn new(accessor: DocumentAccessor, service: Arc<dyn ServiceController>) -> Self {
        Self {
            accessor,
            service,
            lock: Mutex::new(()),
        }
    }

    pub fn accessor(&self) -> &DocumentAccessor {
        &self.accessor
    }

    /// Run `apply` against a freshly loaded document.
    ///
    /// If `apply` fails nothing is written and no reload is signalled. Once the
    /// save succeeds the mutation is reported as successful, whatever happens to
    /// the reload.
    pub async fn execute<T>(
        &self,
        action: &str,
        apply: impl FnOnce(&mut ConfigDocument) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.lock.lock().await;

        let mut doc = self.accessor.load()?;
        let out = apply(&mut doc)?;
        self.accessor.save(&doc)?;

        tracing::info!(action, path = %self.accessor.path().display(), "config saved");

        if let Err(e) = self.service.signal_reload() {
            tracing::warn!(action, error = %e, "reload signal failed; config is saved");
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::{json, Value};

    use super::*;
    use crate::{errors::Error, service::testing::FakeController};

    fn setup(contents: &str) -> (tempfile::TempDir, DocumentAccessor) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, contents).unwrap();
        (dir, DocumentAccessor::new(path))
    }

    #[tokio::test]
    async fn failed_validation_skips_save_and_reload() {
        let original = r#"{"inbounds":[],"keep":"me"}"#;
        let (_dir, acc) = setup(original);
        let service = Arc::new(FakeController::default());
        let tx = MutationTransaction::new(acc.clone(), service.clone());

        let res: Result<()> = tx
            .execute("test", |_| Err(Error::UserNotFound("x".to_string())))
            .await;

        assert!(matches!(res, Err(Error::UserNotFound(_))));
        assert_eq!(fs::read_to_string(acc.path()).unwrap(), original);
        assert_eq!(service.calls(), 0);
    }

    #[tokio::test]
    async fn successful_apply_persists_and_signals_once() {
        let (_dir, acc) = setup(r#"{"inbounds":[]}"#);
        let service = Arc::new(FakeController::default());
        let tx = MutationTransaction::new(acc.clone(), service.clone());

        tx.execute("test", |doc| {
            doc.extra.insert("marker".to_string(), json!(1));
            Ok(())
        })
        .await
        .unwrap();

        let saved: Value = serde_json::from_str(&fs::read_to_string(acc.path()).unwrap()).unwrap();
        assert_eq!(saved, json!({ "inbounds": [], "marker": 1 }));
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn reload_failure_does_not_change_outcome() {
        let (_dir, acc) = setup(r#"{}"#);
        let service = Arc::new(FakeController::failing());
        let tx = MutationTransaction::new(acc, service.clone());

        let res = tx.execute("test", |_| Ok(7)).await;
        assert_eq!(res.unwrap(), 7);
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn missing_document_fails_before_apply() {
        let dir = tempfile::tempdir().unwrap();
        let acc = DocumentAccessor::new(dir.path().join("config.json"));
        let service = Arc::new(FakeController::default());
        let tx = MutationTransaction::new(acc, service.clone());

        let mut applied = false;
        let res = tx
            .execute("test", |_| {
                applied = true;
                Ok(())
            })
            .await;

        assert!(matches!(res, Err(Error::DocumentMissing { .. })));
        assert!(!applied);
        assert_eq!(service.calls(), 0);
    }
}
