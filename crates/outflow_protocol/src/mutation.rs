//! Outbound mutation batch.

use crate::error::ProtocolResult;
use crate::group::{group_by_transaction, TransactionGroup};
use crate::operation::{ChangeRecord, Operation, Row};
use serde::{Deserialize, Serialize};

/// Routing metadata attached to every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// Name of the server-side relation the mutation targets.
    pub relation: String,
}

/// One mutation as understood by the ingestion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    /// Kind of mutation.
    #[serde(rename = "type")]
    pub operation: Operation,
    /// Post-mutation row.
    pub modified: Row,
    /// Routing metadata.
    #[serde(rename = "syncMetadata")]
    pub sync_metadata: SyncMetadata,
}

impl Mutation {
    /// Builds the mutation for a transaction group.
    ///
    /// Only the group's first record is forwarded. Later records of the same
    /// transaction are consumed locally without being sent.
    pub fn from_group(group: &TransactionGroup<'_>, relation: &str) -> Self {
        let head = group.head();
        Self {
            operation: head.operation,
            modified: head.value.clone(),
            sync_metadata: SyncMetadata {
                relation: relation.to_string(),
            },
        }
    }
}

/// Request body posted to the ingestion endpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MutationBatch {
    /// One mutation per transaction, ordered by transaction id.
    pub mutations: Vec<Mutation>,
}

impl MutationBatch {
    /// Groups drained changes by transaction and builds the batch.
    pub fn from_changes(changes: &[ChangeRecord], relation: &str) -> Self {
        let mutations = group_by_transaction(changes)
            .iter()
            .map(|group| Mutation::from_group(group, relation))
            .collect();
        Self { mutations }
    }

    /// Number of mutations in the batch.
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// Returns true if the batch carries no mutations.
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Encodes the batch as a JSON request body.
    pub fn to_json(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a batch from a JSON request body.
    pub fn from_json(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn change(id: u64, operation: Operation, key: &str, tx: &str) -> ChangeRecord {
        let value = json!({"pub_key": key, "name": format!("n{id}")});
        ChangeRecord::new(
            id,
            operation,
            value.as_object().cloned().unwrap(),
            format!("w{id}"),
            tx,
        )
    }

    #[test]
    fn wire_shape() {
        let changes = vec![change(1, Operation::Insert, "k1", "t1")];
        let batch = MutationBatch::from_changes(&changes, "users");

        let body: serde_json::Value = serde_json::from_slice(&batch.to_json().unwrap()).unwrap();
        assert_eq!(
            body,
            json!({
                "mutations": [{
                    "type": "insert",
                    "modified": {"pub_key": "k1", "name": "n1"},
                    "syncMetadata": {"relation": "users"}
                }]
            })
        );
    }

    #[test]
    fn one_mutation_per_transaction_in_order() {
        let changes = vec![
            change(1, Operation::Insert, "a", "T2"),
            change(2, Operation::Update, "b", "T1"),
            change(3, Operation::Delete, "c", "T1"),
        ];
        let batch = MutationBatch::from_changes(&changes, "users");

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.mutations[0].operation, Operation::Update);
        assert_eq!(batch.mutations[0].modified["pub_key"], "b");
        assert_eq!(batch.mutations[1].operation, Operation::Insert);
        assert_eq!(batch.mutations[1].modified["pub_key"], "a");
    }

    #[test]
    fn empty_changes_make_empty_batch() {
        let batch = MutationBatch::from_changes(&[], "users");
        assert!(batch.is_empty());
        assert_eq!(batch.to_json().unwrap(), br#"{"mutations":[]}"#.to_vec());
    }

    #[test]
    fn decodes_ingested_body() {
        let body = br#"{"mutations":[{"type":"delete","modified":{"pub_key":"z"},"syncMetadata":{"relation":"users"}}]}"#;
        let batch = MutationBatch::from_json(body).unwrap();
        assert_eq!(batch.mutations[0].operation, Operation::Delete);
        assert_eq!(batch.mutations[0].sync_metadata.relation, "users");
    }
}
