use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use thiserror::Error;

pub type RecordId = u64;

/// Currency assumed when the export doesn't carry one per row.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Description used for a merged entry whose members carry different payees.
pub const MERGED_PAYEE: &str = "(merged)";

/// One transaction from the source export. `amount` is the movement on the
/// account-side leg; for a split record the counter-party side is carried by
/// `splits` instead of `category`, and `amount + sum(splits) == 0` must hold.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Record {
    pub id: RecordId,
    pub timestamp: NaiveDateTime,
    pub amount: Decimal,
    pub account: String,
    pub category: String,
    /// Peer asset account for a transfer; the counter-leg then lives on that
    /// account instead of a category. The export carries only one record per
    /// transfer pair.
    pub transfer_account: Option<String>,
    pub payee: Option<String>,
    pub note: Option<String>,
    pub currency: String,
    pub splits: Vec<SubPosting>,
}

impl Record {
    pub fn is_split(&self) -> bool {
        !self.splits.is_empty()
    }

    /// How far a split record is from balancing; zero for a good split.
    pub fn split_imbalance(&self) -> Decimal {
        self.amount + self.splits.iter().map(|s| s.amount).sum::<Decimal>()
    }
}

/// One counter-party leg of a split record, amount already on the
/// counter-party side.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SubPosting {
    pub category: String,
    pub amount: Decimal,
}

/// One account/amount line of a finished journal entry. `account` is the
/// classified hierarchical path, not the raw export name.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Posting {
    pub account: String,
    pub amount: Decimal,
}

/// The unit of output: one journal entry, balanced to zero, traceable back
/// to the export through `refs`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LedgerEntry {
    pub when: NaiveDateTime,
    pub payee: Option<String>,
    pub note: Option<String>,
    pub refs: Vec<RecordId>,
    pub currency: String,
    pub postings: Vec<Posting>,
}

/// Structural failures that abort the run. Malformed individual rows are
/// handled as skip-and-warn in the reader and never reach this enum;
/// emitting an unbalanced or duplicated entry would corrupt the journal, so
/// these are fatal.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("Duplicate record #{0} in export")]
    DuplicateRecord(RecordId),
    #[error("Split record #{id} does not balance (off by {off})")]
    UnbalancedSplit { id: RecordId, off: Decimal },
}
