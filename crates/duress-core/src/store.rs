//! Durable storage for the action configuration.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use serde::{Deserialize, Serialize};

use crate::{bundle::AccountActions, ports::ConfigPersistence, utils::iso_timestamp_utc, Result};

pub trait ActionStore: Send + Sync {
    fn load(&self) -> Result<Vec<AccountActions>>;
    fn save(&self, accounts: &[AccountActions]) -> Result<()>;
}

#[derive(Serialize)]
struct StoreFileOut<'a> {
    saved_at: String,
    accounts: &'a [AccountActions],
}

#[derive(Deserialize)]
struct StoreFileIn {
    #[serde(default)]
    accounts: Vec<AccountActions>,
}

/// Pretty JSON file, replaced atomically on save.
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ActionStore for JsonFileStore {
    fn load(&self) -> Result<Vec<AccountActions>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let txt = fs::read_to_string(&self.path)?;
        if txt.trim().is_empty() {
            return Ok(Vec::new());
        }
        let data: StoreFileIn = serde_json::from_str(&txt)?;

        let mut accounts = data.accounts;
        for bundle in accounts.iter_mut() {
            let dropped = bundle.retain_own();
            if dropped > 0 {
                tracing::warn!(account = %bundle.account_id, dropped, "ignoring actions bound to another account");
            }
            if bundle.keep_log_out_last() {
                tracing::warn!(account = %bundle.account_id, "log-out was not last, moved it to the end");
            }
        }
        Ok(accounts)
    }

    fn save(&self, accounts: &[AccountActions]) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let data = StoreFileOut {
            saved_at: iso_timestamp_utc(),
            accounts,
        };
        let txt = serde_json::to_string_pretty(&data)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, txt)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Collects save requests raised while actions run; the runner flushes once.
#[derive(Debug, Default)]
pub struct SaveRequests {
    count: AtomicUsize,
}

impl SaveRequests {
    /// Whether any save was requested since the last call.
    pub fn take(&self) -> bool {
        self.count.swap(0, Ordering::SeqCst) > 0
    }
}

impl ConfigPersistence for SaveRequests {
    fn request_save(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{account::AccountOp, decoy::DecoyEntry, ActionKind};
    use crate::domain::AccountId;

    #[test]
    fn missing_or_empty_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("actions.json"));
        assert!(store.load().unwrap().is_empty());

        fs::write(store.path(), "  \n").unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn save_then_load_preserves_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested/actions.json"));

        let mut b = AccountActions::new(AccountId(1));
        b.set_chats_to_remove(vec![-5, 7]);
        b.add_decoy_message(DecoyEntry::new(42, "hi", true));
        b.toggle(AccountOp::LogOut);
        store.save(std::slice::from_ref(&b)).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"saved_at\""));
        assert!(!dir.path().join("nested/actions.json.tmp").exists());

        let loaded = store.load().unwrap();
        assert_eq!(loaded, vec![b]);
    }

    #[test]
    fn load_moves_hand_edited_log_out_last() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("actions.json"));
        fs::write(
            store.path(),
            r#"{"accounts":[{"account_id":1,"actions":[
                {"type":"account_op","account_id":1,"op":"log_out"},
                {"type":"decoy_messages","account_id":1,"entries":[
                    {"target_id":42,"text":"hi","append_geolocation":false}
                ]}
            ]}]}"#,
        )
        .unwrap();

        let loaded = store.load().unwrap();
        let last = loaded[0].actions().last().map(|a| a.kind());
        assert_eq!(last, Some(ActionKind::AccountOp(AccountOp::LogOut)));
        assert_eq!(loaded[0].decoy_messages().len(), 1);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("actions.json"));
        fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().is_err());
    }

    #[test]
    fn save_requests_coalesce() {
        let s = SaveRequests::default();
        assert!(!s.take());
        s.request_save();
        s.request_save();
        assert!(s.take());
        assert!(!s.take());
    }
}
