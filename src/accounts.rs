use crate::data::Record;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

/// Root used for export account names absent from the mapping table.
const ASSET_ROOT: &str = "Assets";
/// Root used for category names absent from the mapping table.
const CATEGORY_ROOT: &str = "Expenses";
/// Counter-party path for a record with no category at all.
const UNKNOWN_CATEGORY: &str = "Expenses:Unknown";

/// Maps raw export account/category names to hierarchical ledger account
/// paths. Table-driven and pure: an unmapped name degrades to a passthrough
/// path under a conventional root instead of failing, so classification can
/// never abort a run.
#[derive(Debug, Default)]
pub(crate) struct Classifier {
    accounts: HashMap<String, String>,
    categories: HashMap<String, String>,
}

impl Classifier {
    pub fn new(accounts: HashMap<String, String>, categories: HashMap<String, String>) -> Self {
        Self { accounts, categories }
    }

    /// Load both mapping tables from optional JSON files of
    /// `{"raw name": "Ledger:Account:Path"}`. A missing file means an empty
    /// table, i.e. pure passthrough classification.
    pub fn from_files(
        accounts: Option<&Path>,
        categories: Option<&Path>,
    ) -> Result<Self, anyhow::Error> {
        Ok(Self::new(load_table(accounts)?, load_table(categories)?))
    }

    /// Classified asset-side path for an export account/book name.
    pub fn account(&self, raw: &str) -> String {
        match self.accounts.get(raw) {
            Some(path) => path.clone(),
            None => format!("{ASSET_ROOT}:{raw}"),
        }
    }

    /// Classified counter-party path for an export category label. An empty
    /// label (transfer or uncategorized row) maps to the unknown bucket.
    pub fn category(&self, raw: &str) -> String {
        if raw.is_empty() {
            return UNKNOWN_CATEGORY.to_string();
        }
        match self.categories.get(raw) {
            Some(path) => path.clone(),
            None => format!("{CATEGORY_ROOT}:{raw}"),
        }
    }

    /// Counter-party path for a whole record. A transfer's counter-leg lives
    /// on the peer asset account, so it goes through the account table; only
    /// non-transfer records classify through the category table.
    pub fn counterparty(&self, record: &Record) -> String {
        match &record.transfer_account {
            Some(peer) => self.account(peer),
            None => self.category(&record.category),
        }
    }
}

fn load_table(path: Option<&Path>) -> Result<HashMap<String, String>, anyhow::Error> {
    match path {
        Some(path) => {
            let file = File::open(path)?;
            Ok(serde_json::from_reader(file)?)
        }
        None => Ok(HashMap::new()),
    }
}
