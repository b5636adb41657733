use crate::accounts::Classifier;
use crate::data::{Error, LedgerEntry, Posting, Record, MERGED_PAYEE};
use crate::exclude::ExclusionIndex;
use chrono::{NaiveDateTime, SubsecRound};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Default)]
pub(crate) struct AggregateOptions {
    /// Also require an equal counter-party path before merging same-second
    /// records. Off by default: same-second multiplicity normally comes from
    /// rapid successive entries into the same book, whatever the category.
    pub group_by_category: bool,
}

/// Turn non-excluded records into balanced journal entries. Split records
/// pass through one-to-one; simple records merge per account and second.
/// Every record that survives the exclusion filter ends up in exactly one
/// entry's refs, or the whole run fails.
pub(crate) fn aggregate(
    records: Vec<Record>,
    classifier: &Classifier,
    excludes: &ExclusionIndex,
    options: &AggregateOptions,
) -> Result<Vec<LedgerEntry>, Error> {
    let mut entries = Vec::new();
    let mut groups: HashMap<GroupKey, Vec<Record>> = HashMap::new();
    for record in records {
        if excludes.is_excluded(record.id) {
            debug!(id = record.id, "dropping already-recorded transaction");
            continue;
        }
        if record.is_split() {
            entries.push(split_entry(record, classifier)?);
        } else {
            let key = GroupKey::of(&record, classifier, options);
            groups.entry(key).or_default().push(record);
        }
    }
    for members in groups.into_values() {
        entries.push(merge_group(members, classifier));
    }
    check_unique_refs(&entries)?;
    Ok(entries)
}

/// Merge key for simple records. Currency is part of the key so a shared
/// account leg never sums across commodities.
#[derive(Debug, Hash, PartialEq, Eq)]
struct GroupKey {
    account: String,
    currency: String,
    second: NaiveDateTime,
    category: Option<String>,
}

impl GroupKey {
    fn of(record: &Record, classifier: &Classifier, options: &AggregateOptions) -> Self {
        Self {
            account: record.account.clone(),
            currency: record.currency.clone(),
            second: record.timestamp.trunc_subsecs(0),
            category: options
                .group_by_category
                .then(|| classifier.counterparty(record)),
        }
    }
}

/// A split already carries its postings; it only needs classification and
/// the balance check. Rebalancing a bad split here would silently corrupt
/// the source data's intent, so it aborts instead.
fn split_entry(record: Record, classifier: &Classifier) -> Result<LedgerEntry, Error> {
    let off = record.split_imbalance();
    if !off.is_zero() {
        return Err(Error::UnbalancedSplit { id: record.id, off });
    }
    let mut postings = vec![Posting {
        account: classifier.account(&record.account),
        amount: record.amount,
    }];
    postings.extend(record.splits.iter().map(|sub| Posting {
        account: classifier.category(&sub.category),
        amount: sub.amount,
    }));
    Ok(LedgerEntry {
        when: record.timestamp,
        payee: record.payee,
        note: record.note,
        refs: vec![record.id],
        currency: record.currency,
        postings,
    })
}

/// One shared account leg summing all member amounts, then one counter-party
/// posting per classified path (postings are keyed by account, so two members
/// hitting the same path collapse into one). Members are ordered by id first
/// so output is reproducible whatever order the export arrived in. A
/// singleton group goes through the exact same path.
fn merge_group(mut members: Vec<Record>, classifier: &Classifier) -> LedgerEntry {
    members.sort_by_key(|r| r.id);
    let total: Decimal = members.iter().map(|r| r.amount).sum();
    let mut postings = vec![Posting {
        account: classifier.account(&members[0].account),
        amount: total,
    }];
    for member in &members {
        let path = classifier.counterparty(member);
        match postings[1..].iter_mut().find(|p| p.account == path) {
            Some(posting) => posting.amount -= member.amount,
            None => postings.push(Posting {
                account: path,
                amount: -member.amount,
            }),
        }
    }
    LedgerEntry {
        when: members[0].timestamp,
        payee: shared_payee(&members),
        note: shared_note(&members),
        refs: members.iter().map(|r| r.id).collect(),
        currency: members[0].currency.clone(),
        postings,
    }
}

fn shared_payee(members: &[Record]) -> Option<String> {
    let distinct: HashSet<&str> = members
        .iter()
        .filter_map(|r| r.payee.as_deref())
        .collect();
    match distinct.len() {
        0 => None,
        1 => distinct.into_iter().next().map(str::to_string),
        _ => Some(MERGED_PAYEE.to_string()),
    }
}

fn shared_note(members: &[Record]) -> Option<String> {
    let distinct: HashSet<&str> = members.iter().filter_map(|r| r.note.as_deref()).collect();
    if distinct.len() == 1 {
        distinct.into_iter().next().map(str::to_string)
    } else {
        None
    }
}

fn check_unique_refs(entries: &[LedgerEntry]) -> Result<(), Error> {
    let mut seen = HashSet::new();
    for entry in entries {
        for &id in &entry.refs {
            if !seen.insert(id) {
                return Err(Error::DuplicateRecord(id));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{aggregate, AggregateOptions};
    use crate::accounts::Classifier;
    use crate::data::{Error, LedgerEntry, Record, RecordId, SubPosting, DEFAULT_CURRENCY};
    use crate::exclude::ExclusionIndex;
    use chrono::NaiveDateTime;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn ts(time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("2024-03-05 {time}"), "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn rec(id: RecordId, time: &str, account: &str, category: &str, amount: Decimal) -> Record {
        Record {
            id,
            timestamp: ts(time),
            amount,
            account: account.to_string(),
            category: category.to_string(),
            transfer_account: None,
            payee: None,
            note: None,
            currency: DEFAULT_CURRENCY.to_string(),
            splits: Vec::new(),
        }
    }

    fn run(records: Vec<Record>) -> Vec<LedgerEntry> {
        aggregate(
            records,
            &Classifier::default(),
            &ExclusionIndex::default(),
            &AggregateOptions::default(),
        )
        .unwrap()
    }

    fn balance(entry: &LedgerEntry) -> Decimal {
        entry.postings.iter().map(|p| p.amount).sum()
    }

    #[test]
    fn same_second_records_merge() {
        let entries = run(vec![
            rec(1, "10:00:01", "Wallet", "Food", dec!(-5.00)),
            rec(2, "10:00:01", "Wallet", "Transport", dec!(-3.00)),
            rec(3, "10:00:03", "Wallet", "Food", dec!(-2.00)),
        ]);
        assert_eq!(entries.len(), 2);
        let merged = entries.iter().find(|e| e.refs == [1, 2]).unwrap();
        assert_eq!(merged.postings.len(), 3);
        assert_eq!(merged.postings[0].account, "Assets:Wallet");
        assert_eq!(merged.postings[0].amount, dec!(-8.00));
        assert_eq!(merged.postings[1].account, "Expenses:Food");
        assert_eq!(merged.postings[1].amount, dec!(5.00));
        assert_eq!(merged.postings[2].account, "Expenses:Transport");
        assert_eq!(merged.postings[2].amount, dec!(3.00));
        assert_eq!(balance(merged), dec!(0));
        let single = entries.iter().find(|e| e.refs == [3]).unwrap();
        assert_eq!(single.postings.len(), 2);
        assert_eq!(balance(single), dec!(0));
    }

    #[test]
    fn same_counterparty_postings_collapse() {
        let entries = run(vec![
            rec(1, "10:00:01", "Wallet", "Food", dec!(-5.00)),
            rec(2, "10:00:01", "Wallet", "Food", dec!(-3.00)),
        ]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].postings.len(), 2);
        assert_eq!(entries[0].postings[1].account, "Expenses:Food");
        assert_eq!(entries[0].postings[1].amount, dec!(8.00));
    }

    #[test]
    fn different_accounts_do_not_merge() {
        let entries = run(vec![
            rec(1, "10:00:01", "Wallet", "Food", dec!(-5.00)),
            rec(2, "10:00:01", "Checking", "Food", dec!(-3.00)),
        ]);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn group_by_category_splits_groups() {
        let records = vec![
            rec(1, "10:00:01", "Wallet", "Food", dec!(-5.00)),
            rec(2, "10:00:01", "Wallet", "Transport", dec!(-3.00)),
        ];
        let entries = aggregate(
            records,
            &Classifier::default(),
            &ExclusionIndex::default(),
            &AggregateOptions {
                group_by_category: true,
            },
        )
        .unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn split_record_passes_through() {
        let mut record = rec(10, "12:00:00", "Wallet", "", dec!(10.00));
        record.splits = vec![
            SubPosting {
                category: "Food".to_string(),
                amount: dec!(-6.00),
            },
            SubPosting {
                category: "Transport".to_string(),
                amount: dec!(-4.00),
            },
        ];
        let entries = run(vec![record]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].refs, [10]);
        assert_eq!(entries[0].postings.len(), 3);
        assert_eq!(balance(&entries[0]), dec!(0));
    }

    #[test]
    fn unbalanced_split_is_fatal() {
        let mut record = rec(10, "12:00:00", "Wallet", "", dec!(10.00));
        record.splits = vec![SubPosting {
            category: "Food".to_string(),
            amount: dec!(-6.00),
        }];
        let err = aggregate(
            vec![record],
            &Classifier::default(),
            &ExclusionIndex::default(),
            &AggregateOptions::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            Error::UnbalancedSplit {
                id: 10,
                off: dec!(4.00)
            }
        );
    }

    #[test]
    fn excluded_records_are_dropped() {
        let excludes = ExclusionIndex::parse("; refs: 1,3");
        let entries = aggregate(
            vec![
                rec(1, "10:00:01", "Wallet", "Food", dec!(-5.00)),
                rec(2, "10:00:01", "Wallet", "Food", dec!(-3.00)),
                rec(3, "10:00:03", "Wallet", "Food", dec!(-2.00)),
            ],
            &Classifier::default(),
            &excludes,
            &AggregateOptions::default(),
        )
        .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].refs, [2]);
    }

    #[test]
    fn everything_excluded_yields_no_entries() {
        let excludes = ExclusionIndex::parse("; refs: 1");
        let entries = aggregate(
            vec![rec(1, "10:00:01", "Wallet", "Food", dec!(-5.00))],
            &Classifier::default(),
            &excludes,
            &AggregateOptions::default(),
        )
        .unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn net_zero_account_leg_is_still_emitted() {
        let entries = run(vec![
            rec(1, "10:00:01", "Wallet", "Food", dec!(-5.00)),
            rec(2, "10:00:01", "Wallet", "Refund", dec!(5.00)),
        ]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].postings[0].amount, dec!(0.00));
        assert_eq!(entries[0].refs, [1, 2]);
        assert_eq!(balance(&entries[0]), dec!(0));
    }

    #[test]
    fn every_record_lands_in_exactly_one_entry() {
        let entries = run(vec![
            rec(4, "10:00:01", "Wallet", "Food", dec!(-5.00)),
            rec(2, "10:00:01", "Wallet", "Transport", dec!(-3.00)),
            rec(9, "11:30:00", "Checking", "Rent", dec!(-700.00)),
        ]);
        let mut seen: Vec<_> = entries.iter().flat_map(|e| e.refs.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, [2, 4, 9]);
    }

    #[test]
    fn duplicate_record_id_is_fatal() {
        let err = aggregate(
            vec![
                rec(1, "10:00:01", "Wallet", "Food", dec!(-5.00)),
                rec(1, "10:00:03", "Wallet", "Food", dec!(-3.00)),
            ],
            &Classifier::default(),
            &ExclusionIndex::default(),
            &AggregateOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err, Error::DuplicateRecord(1));
    }

    #[test]
    fn transfer_counter_leg_is_an_asset_account() {
        let mut transfer = rec(5, "09:00:00", "Wallet", "", dec!(-100.00));
        transfer.transfer_account = Some("Savings".to_string());
        let entries = run(vec![transfer]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].postings[0].account, "Assets:Wallet");
        assert_eq!(entries[0].postings[1].account, "Assets:Savings");
        assert_eq!(entries[0].postings[1].amount, dec!(100.00));
        assert_eq!(balance(&entries[0]), dec!(0));
    }

    #[test]
    fn transfer_peer_uses_the_account_table() {
        use std::collections::HashMap;
        let classifier = Classifier::new(
            HashMap::from([("Savings".to_string(), "Assets:Bank:Savings".to_string())]),
            HashMap::new(),
        );
        let mut transfer = rec(5, "09:00:00", "Wallet", "", dec!(-100.00));
        transfer.transfer_account = Some("Savings".to_string());
        let entries = aggregate(
            vec![transfer],
            &classifier,
            &ExclusionIndex::default(),
            &AggregateOptions::default(),
        )
        .unwrap();
        assert_eq!(entries[0].postings[1].account, "Assets:Bank:Savings");
    }

    #[test]
    fn merged_payee_only_when_all_agree() {
        let mut a = rec(1, "10:00:01", "Wallet", "Food", dec!(-5.00));
        a.payee = Some("Bakery".to_string());
        let mut b = rec(2, "10:00:01", "Wallet", "Food", dec!(-3.00));
        b.payee = Some("Bakery".to_string());
        let entries = run(vec![a.clone(), b.clone()]);
        assert_eq!(entries[0].payee.as_deref(), Some("Bakery"));

        b.payee = Some("Butcher".to_string());
        let entries = run(vec![a, b]);
        assert_eq!(entries[0].payee.as_deref(), Some("(merged)"));
    }
}
