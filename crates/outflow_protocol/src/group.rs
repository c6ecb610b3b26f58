//! Partitioning drained change records into transactions.

use crate::operation::ChangeRecord;
use std::collections::BTreeMap;

/// All drained change records sharing one `transaction_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionGroup<'a> {
    /// The shared transaction id.
    pub transaction_id: &'a str,
    /// Records of the transaction, in drain (id) order.
    pub changes: Vec<&'a ChangeRecord>,
}

impl<'a> TransactionGroup<'a> {
    /// Returns the record that represents this transaction on the wire.
    ///
    /// Groups are never empty, so this is the lowest-id record.
    pub fn head(&self) -> &'a ChangeRecord {
        self.changes[0]
    }

    /// Number of records in the group.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Always false: a group exists only because a record named it.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Groups records by `transaction_id`.
///
/// Groups come out in ascending byte-wise order of `transaction_id`, not in
/// id order: transactions whose ids interleave are not reordered causally.
/// Within a group the input order is kept.
pub fn group_by_transaction(changes: &[ChangeRecord]) -> Vec<TransactionGroup<'_>> {
    let mut groups: BTreeMap<&str, Vec<&ChangeRecord>> = BTreeMap::new();

    for change in changes {
        groups
            .entry(change.transaction_id.as_str())
            .or_default()
            .push(change);
    }

    groups
        .into_iter()
        .map(|(transaction_id, changes)| TransactionGroup {
            transaction_id,
            changes,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{Operation, Row};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn change(id: u64, tx: &str) -> ChangeRecord {
        let mut value = Row::new();
        value.insert("pub_key".into(), format!("k{id}").into());
        ChangeRecord::new(id, Operation::Insert, value, format!("w{id}"), tx)
    }

    #[test]
    fn empty_input() {
        assert!(group_by_transaction(&[]).is_empty());
    }

    #[test]
    fn groups_sorted_by_transaction_id() {
        let changes = vec![change(1, "b"), change(2, "a"), change(3, "b"), change(4, "c")];
        let groups = group_by_transaction(&changes);

        let ids: Vec<&str> = groups.iter().map(|g| g.transaction_id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        assert_eq!(groups[1].len(), 2);
        assert_eq!(groups[1].head().id, 1);
        assert_eq!(groups[1].changes[1].id, 3);
    }

    #[test]
    fn lexical_not_numeric_order() {
        let changes = vec![change(1, "10"), change(2, "9")];
        let groups = group_by_transaction(&changes);
        assert_eq!(groups[0].transaction_id, "10");
        assert_eq!(groups[1].transaction_id, "9");
    }

    proptest! {
        #[test]
        fn groups_partition_input(txs in proptest::collection::vec("[a-d]{1,2}", 0..40)) {
            let changes: Vec<ChangeRecord> = txs
                .iter()
                .enumerate()
                .map(|(i, tx)| change(i as u64 + 1, tx))
                .collect();

            let groups = group_by_transaction(&changes);

            let input: BTreeSet<u64> = changes.iter().map(|c| c.id).collect();
            let grouped: Vec<u64> = groups
                .iter()
                .flat_map(|g| g.changes.iter().map(|c| c.id))
                .collect();
            prop_assert_eq!(grouped.len(), input.len());
            prop_assert_eq!(grouped.into_iter().collect::<BTreeSet<_>>(), input);

            for pair in groups.windows(2) {
                prop_assert!(pair[0].transaction_id <= pair[1].transaction_id);
            }
            for group in &groups {
                prop_assert!(!group.is_empty());
                prop_assert!(group.changes.iter().all(|c| c.transaction_id == group.transaction_id));
                prop_assert!(group.changes.windows(2).all(|w| w[0].id < w[1].id));
            }
        }
    }
}
