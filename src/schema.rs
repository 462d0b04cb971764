//! Schema registry: `RelationConfig` and `ConditionDefinition` records,
//! keyed by `(object_type, relation)` / `name` respectively.
//!
//! Schemas arrive as already-structured records. There is no DSL parser
//! here. `SchemaRegistry` is the read-only (during a check) collection
//! the evaluator consults.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One operand of an `intersection` rewrite.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum IntersectionOperand {
    Direct,
    ComputedUserset { relation: String },
    TupleToUserset {
        tupleset: String,
        computed_userset: String,
    },
}

/// One `tuple_to_userset` entry: follow `tupleset` to a referenced object,
/// then ask whether the subject holds `computed_userset` on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TupleToUsersetDef {
    pub tupleset: String,
    pub computed_userset: String,
}

/// How one `(object_type, relation)` is computed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationConfig {
    /// Subject types (or `"T:*"` / `"T#rel"` forms) accepted on a direct
    /// tuple for this relation. `None` means no direct tuples are
    /// accepted (the relation is purely a rewrite).
    pub directly_assignable_types: Option<Vec<String>>,

    /// Sibling relations whose truth implies this one (union).
    pub implied_by: Option<Vec<String>>,

    /// A single sibling relation this one is defined as equal to.
    pub computed_userset: Option<String>,

    /// Tuple-to-userset rewrites.
    pub tuple_to_userset: Option<Vec<TupleToUsersetDef>>,

    /// Sibling relation whose truth denies this one. Applied last,
    /// outermost.
    pub excluded_by: Option<String>,

    /// AND-composition of operands.
    pub intersection: Option<Vec<IntersectionOperand>>,

    /// Whether tuples with a `subject_relation` are accepted on this
    /// relation at all (independent of `directly_assignable_types`
    /// listing `T#rel` entries, which govern *which* T may be a userset).
    #[serde(default)]
    pub allows_userset_subjects: bool,
}

impl RelationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_directly_assignable_types(mut self, types: Vec<String>) -> Self {
        self.directly_assignable_types = Some(types);
        self
    }

    pub fn with_implied_by(mut self, relations: Vec<String>) -> Self {
        self.implied_by = Some(relations);
        self
    }

    pub fn with_computed_userset(mut self, relation: impl Into<String>) -> Self {
        self.computed_userset = Some(relation.into());
        self
    }

    pub fn with_tuple_to_userset(mut self, rewrites: Vec<TupleToUsersetDef>) -> Self {
        self.tuple_to_userset = Some(rewrites);
        self
    }

    pub fn with_excluded_by(mut self, relation: impl Into<String>) -> Self {
        self.excluded_by = Some(relation.into());
        self
    }

    pub fn with_intersection(mut self, operands: Vec<IntersectionOperand>) -> Self {
        self.intersection = Some(operands);
        self
    }

    pub fn allowing_userset_subjects(mut self) -> Self {
        self.allows_userset_subjects = true;
        self
    }

    /// `subject_type` (plain), `"subject_type:*"` (wildcard), or
    /// `"subject_type#subject_relation"` (userset): which of these forms
    /// are permitted on a direct tuple for this relation.
    pub fn accepts_subject_type(&self, descriptor: &str) -> bool {
        self.directly_assignable_types
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .any(|t| t == descriptor)
    }
}

/// Declared type of a condition parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Bool,
    String,
    Int,
    Double,
    Timestamp,
    Duration,
    List,
    Map,
}

/// A named, typed CEL-like boolean expression attached to tuples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionDefinition {
    pub name: String,
    pub parameters: HashMap<String, ParamType>,
    pub expression: String,
}

impl ConditionDefinition {
    pub fn new(
        name: impl Into<String>,
        parameters: HashMap<String, ParamType>,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            parameters,
            expression: expression.into(),
        }
    }
}

/// Advisory warning produced by `SchemaRegistry::validate`.
/// Never blocks a write: missing configs on *read* deny rather than
/// crash, so validation here is informational only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaWarning {
    DanglingReference {
        object_type: String,
        relation: String,
        references: String,
    },
}

/// The read-only-during-a-check collection of `RelationConfig` and
/// `ConditionDefinition` records.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    relations: HashMap<(String, String), RelationConfig>,
    conditions: HashMap<String, ConditionDefinition>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_relation_config(
        &mut self,
        object_type: impl Into<String>,
        relation: impl Into<String>,
        config: RelationConfig,
    ) {
        self.relations
            .insert((object_type.into(), relation.into()), config);
    }

    /// Returns whether a config existed and was removed.
    pub fn delete_relation_config(&mut self, object_type: &str, relation: &str) -> bool {
        self.relations
            .remove(&(object_type.to_string(), relation.to_string()))
            .is_some()
    }

    pub fn find_relation_config(&self, object_type: &str, relation: &str) -> Option<&RelationConfig> {
        self.relations.get(&(object_type.to_string(), relation.to_string()))
    }

    pub fn upsert_condition_definition(&mut self, definition: ConditionDefinition) {
        self.conditions.insert(definition.name.clone(), definition);
    }

    pub fn delete_condition_definition(&mut self, name: &str) -> bool {
        self.conditions.remove(name).is_some()
    }

    pub fn find_condition_definition(&self, name: &str) -> Option<&ConditionDefinition> {
        self.conditions.get(name)
    }

    /// Advisory pass over every `RelationConfig`, flagging siblings it
    /// references (`implied_by`, `computed_userset`, TTU `computed_userset`,
    /// intersection operands) that have no config of their own. Missing
    /// configs still behave correctly at read time (they deny); this just
    /// surfaces likely schema authoring mistakes.
    pub fn validate(&self) -> Vec<SchemaWarning> {
        let mut warnings = Vec::new();
        for ((object_type, relation), config) in &self.relations {
            let mut check_ref = |target: &str, references: &str| {
                if self.find_relation_config(object_type, target).is_none() {
                    warnings.push(SchemaWarning::DanglingReference {
                        object_type: object_type.clone(),
                        relation: relation.clone(),
                        references: references.to_string(),
                    });
                }
            };

            for sibling in config.implied_by.iter().flatten() {
                check_ref(sibling, sibling);
            }
            if let Some(rel) = &config.computed_userset {
                check_ref(rel, rel);
            }
            for ttu in config.tuple_to_userset.iter().flatten() {
                check_ref(&ttu.computed_userset, &ttu.computed_userset);
            }
            for operand in config.intersection.iter().flatten() {
                match operand {
                    IntersectionOperand::ComputedUserset { relation } => check_ref(relation, relation),
                    IntersectionOperand::TupleToUserset { computed_userset, .. } => {
                        check_ref(computed_userset, computed_userset)
                    }
                    IntersectionOperand::Direct => {}
                }
            }
            if let Some(excluded) = &config.excluded_by {
                check_ref(excluded, excluded);
            }
        }
        warnings
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn dangling_reference_is_flagged_but_not_rejected() {
        let mut registry = SchemaRegistry::new();
        registry.upsert_relation_config(
            "document",
            "viewer",
            RelationConfig::new().with_implied_by(vec!["editor".to_string()]),
        );
        let warnings = registry.validate();
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn accepts_subject_type_checks_exact_descriptor() {
        let config = RelationConfig::new()
            .with_directly_assignable_types(vec!["user".to_string(), "group#member".to_string()]);
        assert!(config.accepts_subject_type("user"));
        assert!(config.accepts_subject_type("group#member"));
        assert!(!config.accepts_subject_type("user:*"));
    }
}
