//! Tuple store interface: the narrow set of indexed lookups the evaluator
//! issues, plus an in-memory reference implementation used by tests and by
//! embedders without a real backing store.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::model::{Tuple, TupleIdentity};

/// Operations consumed by the evaluator and its collaborators. Every
/// method here is an I/O suspension point. No method panics, and
/// failures propagate as `anyhow::Error`; store I/O is the caller's
/// problem.
#[async_trait]
pub trait TupleStore: Send + Sync {
    /// Point lookup for check steps 1/2. `subject_id == "*"` looks up the
    /// wildcard tuple directly; callers expand wildcard matching, the
    /// store does exact lookups only.
    async fn find_direct_tuple(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
        subject_type: &str,
        subject_id: &str,
    ) -> anyhow::Result<Option<Tuple>>;

    /// All tuples on this object/relation whose subject has a
    /// `subject_relation` (userset subjects), used for userset-subject
    /// membership checks.
    async fn find_userset_tuples(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> anyhow::Result<Vec<Tuple>>;

    /// All tuples on this object/relation, any subject shape. Used for
    /// tuple-to-userset enumeration and intersection `direct` operands.
    async fn find_tuples_by_relation(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> anyhow::Result<Vec<Tuple>>;

    async fn insert_tuple(&self, tuple: Tuple) -> anyhow::Result<()>;

    /// Returns whether a matching tuple existed and was removed.
    async fn delete_tuple(&self, identity: &TupleIdentity) -> anyhow::Result<bool>;

    /// Candidate object ids of a type, for `list_objects` enumeration.
    async fn list_candidate_object_ids(&self, object_type: &str) -> anyhow::Result<Vec<String>>;

    /// Direct subjects of an object/relation, unexpanded, for `list_subjects`.
    async fn list_direct_subjects(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> anyhow::Result<Vec<Tuple>>;
}

/// Reference in-memory store. Keeps iteration order stable within a call
/// (insertion order via a secondary `Vec` of keys) and gives read-your-writes
/// within the process.
#[derive(Default)]
pub struct InMemoryTupleStore {
    tuples: Arc<DashMap<TupleIdentity, Tuple>>,
    /// Secondary index: object_type -> object_ids seen, for
    /// `list_candidate_object_ids`.
    objects_by_type: Arc<DashMap<String, Vec<String>>>,
}

impl InMemoryTupleStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn matches(tuple: &Tuple, object_type: &str, object_id: &str, relation: &str) -> bool {
        tuple.object_type == object_type && tuple.object_id == object_id && tuple.relation == relation
    }

    fn track_object(&self, object_type: &str, object_id: &str) {
        let mut entry = self.objects_by_type.entry(object_type.to_string()).or_default();
        if !entry.contains(&object_id.to_string()) {
            entry.push(object_id.to_string());
        }
    }
}

#[async_trait]
impl TupleStore for InMemoryTupleStore {
    async fn find_direct_tuple(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
        subject_type: &str,
        subject_id: &str,
    ) -> anyhow::Result<Option<Tuple>> {
        Ok(self
            .tuples
            .iter()
            .find(|entry| {
                let t = entry.value();
                Self::matches(t, object_type, object_id, relation)
                    && t.subject_type == subject_type
                    && t.subject_id == subject_id
                    && t.subject_relation.is_none()
            })
            .map(|entry| entry.value().clone()))
    }

    async fn find_userset_tuples(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> anyhow::Result<Vec<Tuple>> {
        Ok(self
            .tuples
            .iter()
            .filter(|entry| {
                let t = entry.value();
                Self::matches(t, object_type, object_id, relation) && t.subject_relation.is_some()
            })
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn find_tuples_by_relation(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> anyhow::Result<Vec<Tuple>> {
        Ok(self
            .tuples
            .iter()
            .filter(|entry| Self::matches(entry.value(), object_type, object_id, relation))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn insert_tuple(&self, tuple: Tuple) -> anyhow::Result<()> {
        self.track_object(&tuple.object_type, &tuple.object_id);
        self.tuples.insert(tuple.identity_key(), tuple);
        Ok(())
    }

    async fn delete_tuple(&self, identity: &TupleIdentity) -> anyhow::Result<bool> {
        Ok(self.tuples.remove(identity).is_some())
    }

    async fn list_candidate_object_ids(&self, object_type: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .objects_by_type
            .get(object_type)
            .map(|ids| ids.clone())
            .unwrap_or_default())
    }

    async fn list_direct_subjects(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> anyhow::Result<Vec<Tuple>> {
        self.find_tuples_by_relation(object_type, object_id, relation).await
    }
}

/// Convenience for tests: build an in-memory store preloaded with tuples.
/// `InMemoryTupleStore::insert_tuple` never fails, so this never returns
/// an error in practice; kept fallible to match the trait's shape.
pub async fn seeded_store(tuples: impl IntoIterator<Item = Tuple>) -> anyhow::Result<InMemoryTupleStore> {
    let store = InMemoryTupleStore::new();
    for tuple in tuples {
        store.insert_tuple(tuple).await?;
    }
    Ok(store)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::Tuple;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let store = InMemoryTupleStore::new();
        let tuple = Tuple::new("document", "doc1", "viewer", "user", "alice");
        store.insert_tuple(tuple.clone()).await.unwrap();

        assert!(store
            .find_direct_tuple("document", "doc1", "viewer", "user", "alice")
            .await
            .unwrap()
            .is_some());

        let identity = tuple.identity_key();
        assert!(store.delete_tuple(&identity).await.unwrap());
        assert!(store
            .find_direct_tuple("document", "doc1", "viewer", "user", "alice")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn last_write_wins_on_identity_key() {
        let store = InMemoryTupleStore::new();
        let mut ctx = std::collections::HashMap::new();
        ctx.insert("k".to_string(), serde_json::json!("v1"));
        let first = Tuple::new("document", "doc1", "viewer", "user", "alice")
            .with_condition("cond", ctx);
        store.insert_tuple(first).await.unwrap();

        let second = Tuple::new("document", "doc1", "viewer", "user", "alice");
        store.insert_tuple(second).await.unwrap();

        let stored = store
            .find_direct_tuple("document", "doc1", "viewer", "user", "alice")
            .await
            .unwrap()
            .unwrap();
        assert!(stored.condition_name.is_none());
    }

    #[tokio::test]
    async fn list_candidate_object_ids_tracks_writes() {
        let store = InMemoryTupleStore::new();
        store
            .insert_tuple(Tuple::new("document", "doc1", "viewer", "user", "alice"))
            .await
            .unwrap();
        store
            .insert_tuple(Tuple::new("document", "doc2", "viewer", "user", "bob"))
            .await
            .unwrap();

        let mut ids = store.list_candidate_object_ids("document").await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["doc1".to_string(), "doc2".to_string()]);
    }
}
