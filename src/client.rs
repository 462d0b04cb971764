//! Client façade: the public entry point embedders use. Wraps a store and
//! schema registry behind write-time validation and the read-side
//! operations (`check`, `list_objects`, `list_subjects`).

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{info, warn};

use crate::check::CheckEvaluator;
use crate::condition;
use crate::error::{CoreError, Result};
use crate::list;
use crate::model::{CheckOptions, CheckRequest, Entity, Tuple, TupleIdentity};
use crate::schema::{ConditionDefinition, RelationConfig, SchemaRegistry};
use crate::store::TupleStore;

/// Default recursion bound used when a caller doesn't supply `CheckOptions`
/// explicitly (mirrors `CheckOptions::default`).
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub default_max_depth: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { default_max_depth: 25 }
    }
}

/// The authorization engine façade. Holds a store (trait object, so callers
/// may swap in a persisted backend) and an in-process schema registry.
/// Schema and condition definitions are assumed small enough to keep
/// resident; physical tuple storage is the embedder's concern.
pub struct Client {
    store: Box<dyn TupleStore>,
    schema: RwLock<SchemaRegistry>,
    config: EngineConfig,
}

impl Client {
    pub fn new(store: Box<dyn TupleStore>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: Box<dyn TupleStore>, config: EngineConfig) -> Self {
        Self {
            store,
            schema: RwLock::new(SchemaRegistry::new()),
            config,
        }
    }

    pub fn write_relation_config(&self, object_type: impl Into<String>, relation: impl Into<String>, config: RelationConfig) {
        let object_type = object_type.into();
        let relation = relation.into();
        info!(object_type, relation, "writing relation config");
        self.schema
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .upsert_relation_config(object_type, relation, config);
    }

    pub fn delete_relation_config(&self, object_type: &str, relation: &str) -> bool {
        self.schema
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .delete_relation_config(object_type, relation)
    }

    pub fn write_condition_definition(&self, definition: ConditionDefinition) {
        info!(condition = %definition.name, "writing condition definition");
        self.schema
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .upsert_condition_definition(definition);
    }

    pub fn delete_condition_definition(&self, name: &str) -> bool {
        self.schema
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .delete_condition_definition(name)
    }

    /// Advisory dangling-reference scan over the current schema.
    pub fn validate_schema(&self) -> Vec<crate::schema::SchemaWarning> {
        self.schema.read().unwrap_or_else(|poisoned| poisoned.into_inner()).validate()
    }

    /// Write-time validation: the relation must be configured, the
    /// subject's descriptor must be among `directly_assignable_types`, and
    /// userset subjects require `allows_userset_subjects`. Last-write-wins
    /// on the tuple's identity key.
    pub async fn add_tuple(&self, tuple: Tuple) -> Result<()> {
        {
            let schema = self.schema.read().unwrap_or_else(|poisoned| poisoned.into_inner());

            let config = schema
                .find_relation_config(&tuple.object_type, &tuple.relation)
                .ok_or_else(|| {
                    warn!(object_type = %tuple.object_type, relation = %tuple.relation, "rejected write: no relation config");
                    CoreError::RelationConfigNotFound {
                        object_type: tuple.object_type.clone(),
                        relation: tuple.relation.clone(),
                    }
                })?;

            if let Some(subject_relation) = &tuple.subject_relation {
                if !config.allows_userset_subjects {
                    warn!(object_type = %tuple.object_type, relation = %tuple.relation, "rejected write: userset subjects not allowed");
                    return Err(CoreError::UsersetNotAllowed {
                        object_type: tuple.object_type.clone(),
                        relation: tuple.relation.clone(),
                    });
                }
                let descriptor = format!("{}#{}", tuple.subject_type, subject_relation);
                if !config.accepts_subject_type(&descriptor) {
                    warn!(object_type = %tuple.object_type, relation = %tuple.relation, subject_type = %descriptor, "rejected write: disallowed subject type");
                    return Err(CoreError::InvalidSubjectType {
                        object_type: tuple.object_type.clone(),
                        relation: tuple.relation.clone(),
                        subject_type: descriptor,
                        allowed: config.directly_assignable_types.clone().unwrap_or_default(),
                    });
                }
            } else {
                let descriptor = if tuple.subject_id == crate::model::WILDCARD_SUBJECT_ID {
                    format!("{}:*", tuple.subject_type)
                } else {
                    tuple.subject_type.clone()
                };
                if !config.accepts_subject_type(&descriptor) {
                    warn!(object_type = %tuple.object_type, relation = %tuple.relation, subject_type = %descriptor, "rejected write: disallowed subject type");
                    return Err(CoreError::InvalidSubjectType {
                        object_type: tuple.object_type.clone(),
                        relation: tuple.relation.clone(),
                        subject_type: descriptor,
                        allowed: config.directly_assignable_types.clone().unwrap_or_default(),
                    });
                }
            }

            if let Some(name) = &tuple.condition_name {
                if schema.find_condition_definition(name).is_none() {
                    warn!(condition = %name, "rejected write: unknown condition");
                    return Err(CoreError::ConditionNotFound(name.clone()));
                }
            }
        }

        self.store.insert_tuple(tuple).await.map_err(CoreError::Store)
    }

    /// Returns whether a matching tuple existed and was removed.
    pub async fn remove_tuple(&self, identity: &TupleIdentity) -> Result<bool> {
        self.store.delete_tuple(identity).await.map_err(CoreError::Store)
    }

    pub async fn check(&self, request: &CheckRequest) -> Result<bool> {
        let schema = self.schema.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let evaluator = CheckEvaluator::new(self.store.as_ref(), &schema);
        let options = CheckOptions {
            max_depth: self.config.default_max_depth,
        };
        evaluator.check(request, options).await.map_err(CoreError::Store)
    }

    pub async fn check_with_options(&self, request: &CheckRequest, options: CheckOptions) -> Result<bool> {
        let schema = self.schema.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let evaluator = CheckEvaluator::new(self.store.as_ref(), &schema);
        evaluator.check(request, options).await.map_err(CoreError::Store)
    }

    pub async fn list_objects(
        &self,
        object_type: &str,
        relation: &str,
        subject_type: &str,
        subject_id: &str,
        context: HashMap<String, serde_json::Value>,
    ) -> Result<Vec<Entity>> {
        let schema = self.schema.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let options = CheckOptions {
            max_depth: self.config.default_max_depth,
        };
        list::list_objects(
            self.store.as_ref(),
            &schema,
            object_type,
            relation,
            subject_type,
            subject_id,
            context,
            options,
        )
        .await
        .map_err(CoreError::Store)
    }

    pub async fn list_subjects(&self, object_type: &str, object_id: &str, relation: &str) -> Result<Vec<Tuple>> {
        list::list_subjects(self.store.as_ref(), object_type, object_id, relation)
            .await
            .map_err(CoreError::Store)
    }

    /// Evaluates a condition definition directly against a context, without
    /// a tuple. Exposed for callers building authoring/preview tooling on
    /// top of this crate.
    pub fn evaluate_condition(
        &self,
        name: &str,
        context: &HashMap<String, serde_json::Value>,
    ) -> Result<bool> {
        let schema = self.schema.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let definition = schema
            .find_condition_definition(name)
            .ok_or_else(|| CoreError::ConditionNotFound(name.to_string()))?;
        Ok(condition::evaluate(definition, context)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::InMemoryTupleStore;

    fn client() -> Client {
        Client::new(Box::new(InMemoryTupleStore::new()))
    }

    #[tokio::test]
    async fn add_tuple_rejects_unknown_relation() {
        let client = client();
        let err = client
            .add_tuple(Tuple::new("document", "doc1", "viewer", "user", "alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::RelationConfigNotFound { .. }));
    }

    #[tokio::test]
    async fn add_tuple_rejects_disallowed_subject_type() {
        let client = client();
        client.write_relation_config(
            "document",
            "viewer",
            RelationConfig::new().with_directly_assignable_types(vec!["user".to_string()]),
        );
        let err = client
            .add_tuple(Tuple::new("document", "doc1", "viewer", "group", "eng"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidSubjectType { .. }));
    }

    #[tokio::test]
    async fn add_tuple_rejects_userset_subject_when_not_allowed() {
        let client = client();
        client.write_relation_config(
            "document",
            "viewer",
            RelationConfig::new().with_directly_assignable_types(vec!["group#member".to_string()]),
        );
        let err = client
            .add_tuple(Tuple::new("document", "doc1", "viewer", "group", "eng").userset("member"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UsersetNotAllowed { .. }));
    }

    #[tokio::test]
    async fn add_tuple_accepts_userset_subject_when_allowed() {
        let client = client();
        client.write_relation_config(
            "document",
            "viewer",
            RelationConfig::new()
                .with_directly_assignable_types(vec!["group#member".to_string()])
                .allowing_userset_subjects(),
        );
        client
            .add_tuple(Tuple::new("document", "doc1", "viewer", "group", "eng").userset("member"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn check_denies_when_relation_has_no_config_but_tuple_exists() {
        // Reads never require a schema entry to exist; write-time validation
        // is the only gate. A tuple inserted straight into the store (not
        // via add_tuple) should still be checkable.
        let store = InMemoryTupleStore::new();
        store
            .insert_tuple(Tuple::new("document", "doc1", "viewer", "user", "alice"))
            .await
            .unwrap();
        let client = Client::new(Box::new(store));
        let request = CheckRequest::new("document", "doc1", "viewer", "user", "alice");
        assert!(client.check(&request).await.unwrap());
    }

    #[tokio::test]
    async fn last_write_wins_end_to_end() {
        let client = client();
        client.write_relation_config(
            "document",
            "viewer",
            RelationConfig::new().with_directly_assignable_types(vec!["user".to_string()]),
        );
        client
            .add_tuple(Tuple::new("document", "doc1", "viewer", "user", "alice"))
            .await
            .unwrap();
        let identity = Tuple::new("document", "doc1", "viewer", "user", "alice").identity_key();
        assert!(client.remove_tuple(&identity).await.unwrap());
        assert!(!client.remove_tuple(&identity).await.unwrap());
    }
}
