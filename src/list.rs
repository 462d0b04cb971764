//! List helpers: enumeration-based operations built on top of the
//! tuple store and the check evaluator. Deliberately lower-power than
//! `check`: neither expands rewrites nor claims exhaustive coverage over
//! an unbounded subject space.

use std::collections::HashMap;

use crate::check::CheckEvaluator;
use crate::model::{CheckOptions, CheckRequest, Entity, Tuple};
use crate::schema::SchemaRegistry;
use crate::store::TupleStore;

/// `list_objects`: enumerate every known object of `object_type` and run a
/// full `check` against each. Correct by construction (it reuses `check`),
/// but its result is only as complete as `list_candidate_object_ids`: an
/// object with no tuples at all on it is never a candidate, even if some
/// exotic wildcard or condition-free rewrite would otherwise grant it.
pub async fn list_objects(
    store: &dyn TupleStore,
    schema: &SchemaRegistry,
    object_type: &str,
    relation: &str,
    subject_type: &str,
    subject_id: &str,
    context: HashMap<String, serde_json::Value>,
    options: CheckOptions,
) -> anyhow::Result<Vec<Entity>> {
    let candidates = store.list_candidate_object_ids(object_type).await?;
    let evaluator = CheckEvaluator::new(store, schema);

    let mut granted = Vec::new();
    for object_id in candidates {
        let request = CheckRequest::new(object_type, object_id.clone(), relation, subject_type, subject_id)
            .with_context(context.clone());
        if evaluator.check(&request, options).await? {
            granted.push(Entity::new(object_type, object_id));
        }
    }
    Ok(granted)
}

/// `list_subjects`: the direct subjects of one object/relation, as stored,
/// with no computed-userset, implied-by, tuple-to-userset, intersection, or
/// exclusion expansion. A subject granted only through a rewrite will not
/// appear here even though `check` would return true for it. This is
/// intentionally lower-power than `check`, not a bug.
pub async fn list_subjects(
    store: &dyn TupleStore,
    object_type: &str,
    object_id: &str,
    relation: &str,
) -> anyhow::Result<Vec<Tuple>> {
    store.list_direct_subjects(object_type, object_id, relation).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::seeded_store;

    #[tokio::test]
    async fn list_objects_returns_only_granted_candidates() {
        let store = seeded_store([
            Tuple::new("document", "doc1", "viewer", "user", "alice"),
            Tuple::new("document", "doc2", "viewer", "user", "bob"),
        ])
        .await
        .unwrap();
        let schema = SchemaRegistry::new();

        let granted = list_objects(
            &store,
            &schema,
            "document",
            "viewer",
            "user",
            "alice",
            HashMap::new(),
            CheckOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(granted, vec![Entity::new("document", "doc1")]);
    }

    #[tokio::test]
    async fn list_subjects_does_not_expand_usersets() {
        let store = seeded_store([
            Tuple::new("document", "doc1", "viewer", "group", "eng").userset("member"),
            Tuple::new("group", "eng", "member", "user", "alice"),
        ])
        .await
        .unwrap();

        let subjects = list_subjects(&store, "document", "doc1", "viewer").await.unwrap();

        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0].subject_type, "group");
        assert_eq!(subjects[0].subject_id, "eng");
    }
}
