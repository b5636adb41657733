use crate::data::RecordId;
use std::collections::HashSet;

/// Tag marking the export record ids an entry was generated from.
pub(crate) const REFS_TAG: &str = "refs:";

/// Set of record ids already present in a previously generated journal.
/// Built by scanning arbitrary journal text for `refs:` tags; everything
/// else (postings, comments, other tags) is ignored, so no full ledger
/// grammar is needed here. Empty or malformed input simply yields an empty
/// set — "no excludes file" and "exclude nothing" are the same thing.
#[derive(Debug, Default)]
pub(crate) struct ExclusionIndex {
    ids: HashSet<RecordId>,
}

impl ExclusionIndex {
    pub fn parse(text: &str) -> Self {
        let mut ids = HashSet::new();
        for line in text.lines() {
            let Some(pos) = line.find(REFS_TAG) else {
                continue;
            };
            let value = &line[pos + REFS_TAG.len()..];
            ids.extend(
                value
                    .split([',', ' ', '\t'])
                    .filter(|token| !token.is_empty())
                    .map_while(|token| token.parse::<RecordId>().ok()),
            );
        }
        Self { ids }
    }

    pub fn is_excluded(&self, id: RecordId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::ExclusionIndex;

    #[test]
    fn collects_refs_across_entries() {
        let journal = "\
2024-03-01 * Bakery  ; time: 09:15:00
    ; refs: 1,2
    Assets:Cash:Wallet        -8.00
    Expenses:Food

; a stray comment
2024-03-02 * Cafe
    ; refs: 7 9
    Assets:Cash:Wallet        -3.00
    Expenses:Food
";
        let index = ExclusionIndex::parse(journal);
        assert_eq!(index.len(), 4);
        for id in [1, 2, 7, 9] {
            assert!(index.is_excluded(id));
        }
        assert!(!index.is_excluded(3));
    }

    #[test]
    fn tolerates_unrelated_content_and_junk_tokens() {
        let journal = "\
account Assets:Cash:Wallet
2024-03-01 * Bakery
    ; refs: 4, 5 trailing words ignored
    Assets:Cash:Wallet        -8.00
";
        let index = ExclusionIndex::parse(journal);
        assert!(index.is_excluded(4));
        assert!(index.is_excluded(5));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn empty_or_malformed_input_excludes_nothing() {
        assert_eq!(ExclusionIndex::parse("").len(), 0);
        assert_eq!(ExclusionIndex::parse("not a journal at all").len(), 0);
        assert_eq!(ExclusionIndex::parse("; refs: none here").len(), 0);
    }
}
