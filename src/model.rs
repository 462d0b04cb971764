//! Core data model: relationship tuples and the identifiers addressed during a check.
//!
//! A tuple is `object#relation@subject`, optionally gated by a named
//! condition evaluated against a merged context.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel subject id denoting a type-wildcard subject (`user:*`).
pub const WILDCARD_SUBJECT_ID: &str = "*";

/// One relationship fact: `subject_type:subject_id[#subject_relation]` has
/// `relation` to `object_type:object_id`, optionally gated by a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
    pub object_type: String,
    pub object_id: String,
    pub relation: String,

    pub subject_type: String,
    pub subject_id: String,
    /// Non-null iff the subject is itself a userset ("members of group G").
    pub subject_relation: Option<String>,

    pub condition_name: Option<String>,
    pub condition_context: Option<HashMap<String, serde_json::Value>>,
}

impl Tuple {
    pub fn new(
        object_type: impl Into<String>,
        object_id: impl Into<String>,
        relation: impl Into<String>,
        subject_type: impl Into<String>,
        subject_id: impl Into<String>,
    ) -> Self {
        Self {
            object_type: object_type.into(),
            object_id: object_id.into(),
            relation: relation.into(),
            subject_type: subject_type.into(),
            subject_id: subject_id.into(),
            subject_relation: None,
            condition_name: None,
            condition_context: None,
        }
    }

    pub fn userset(mut self, subject_relation: impl Into<String>) -> Self {
        self.subject_relation = Some(subject_relation.into());
        self
    }

    pub fn with_condition(
        mut self,
        condition_name: impl Into<String>,
        context: HashMap<String, serde_json::Value>,
    ) -> Self {
        self.condition_name = Some(condition_name.into());
        self.condition_context = Some(context);
        self
    }

    pub fn is_conditional(&self) -> bool {
        self.condition_name.is_some()
    }

    pub fn is_wildcard(&self) -> bool {
        self.subject_id == WILDCARD_SUBJECT_ID && self.subject_relation.is_none()
    }

    pub fn is_userset_subject(&self) -> bool {
        self.subject_relation.is_some()
    }

    /// The identity key used for dedup/deletion: the 7-tuple of
    /// non-condition fields. Two tuples differing only in condition data
    /// share an identity and overwrite each other on write.
    pub fn identity_key(&self) -> TupleIdentity {
        TupleIdentity {
            object_type: self.object_type.clone(),
            object_id: self.object_id.clone(),
            relation: self.relation.clone(),
            subject_type: self.subject_type.clone(),
            subject_id: self.subject_id.clone(),
            subject_relation: self.subject_relation.clone(),
        }
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}#{}@{}:{}",
            self.object_type, self.object_id, self.relation, self.subject_type, self.subject_id
        )?;
        if let Some(rel) = &self.subject_relation {
            write!(f, "#{rel}")?;
        }
        Ok(())
    }
}

/// The 7-field identity of a tuple, used as a store key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleIdentity {
    pub object_type: String,
    pub object_id: String,
    pub relation: String,
    pub subject_type: String,
    pub subject_id: String,
    pub subject_relation: Option<String>,
}

/// Identifies one endpoint of a check: an object, subject, or userset
/// reference, the `(type, id[, relation])` triple the evaluator recurses
/// over.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    pub object_type: String,
    pub object_id: String,
}

impl Entity {
    pub fn new(object_type: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            object_id: object_id.into(),
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.object_id)
    }
}

/// A full authorization check request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRequest {
    pub object_type: String,
    pub object_id: String,
    pub relation: String,
    pub subject_type: String,
    pub subject_id: String,
    pub subject_relation: Option<String>,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
}

impl CheckRequest {
    pub fn new(
        object_type: impl Into<String>,
        object_id: impl Into<String>,
        relation: impl Into<String>,
        subject_type: impl Into<String>,
        subject_id: impl Into<String>,
    ) -> Self {
        Self {
            object_type: object_type.into(),
            object_id: object_id.into(),
            relation: relation.into(),
            subject_type: subject_type.into(),
            subject_id: subject_id.into(),
            subject_relation: None,
            context: HashMap::new(),
        }
    }

    pub fn with_context(mut self, context: HashMap<String, serde_json::Value>) -> Self {
        self.context = context;
        self
    }
}

/// Recursion controls for `check`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CheckOptions {
    pub max_depth: u32,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self { max_depth: 25 }
    }
}
