use std::{
    fs, io,
    path::{Path, PathBuf},
};

use cafe_defence_core::{CurrencyStore, LedgerSnapshot, StoreError};
use serde::{Deserialize, Serialize};

/// Currency store persisting the ledger as a small TOML document.
#[derive(Clone, Debug)]
pub(crate) struct LedgerFile {
    path: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerDocument {
    #[serde(default)]
    balances: LedgerSnapshot,
}

impl LedgerFile {
    /// Creates a store reading and writing `path`.
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the ledger document.
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl CurrencyStore for LedgerFile {
    fn load(&mut self) -> Result<LedgerSnapshot, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(LedgerSnapshot::ZERO);
            }
            Err(err) => {
                return Err(StoreError::Unavailable(format!(
                    "{}: {err}",
                    self.path.display()
                )))
            }
        };
        let document: LedgerDocument = toml::from_str(&contents)
            .map_err(|err| StoreError::Corrupt(format!("{}: {err}", self.path.display())))?;
        Ok(document.balances)
    }

    fn save(&mut self, snapshot: &LedgerSnapshot) -> Result<(), StoreError> {
        let document = LedgerDocument {
            balances: *snapshot,
        };
        let contents = toml::to_string(&document)
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                StoreError::Unavailable(format!("{}: {err}", parent.display()))
            })?;
        }
        fs::write(&self.path, contents)
            .map_err(|err| StoreError::Unavailable(format!("{}: {err}", self.path.display())))
    }
}
