//! Zanzibar-style relationship-based authorization decision core.
//!
//! This crate implements the evaluator half of a Google Zanzibar-inspired
//! ReBAC system:
//! - Graph-walking `check` over relationship tuples, with unions,
//!   computed usersets, tuple-to-userset rewrites, intersection, and
//!   exclusion
//! - A small CEL-like expression language for conditional tuples
//! - Enumeration helpers (`list_objects`, `list_subjects`)
//! - Write-time schema validation on the client façade
//!
//! Physical tuple storage, HTTP transport, configuration loading, and a
//! schema DSL are all out of scope here. This crate is the decision
//! procedure an embedder wires a store and a transport around.
//!
//! # Example
//!
//! ```rust
//! use rebac_authz::{Client, RelationConfig, Tuple, CheckRequest, InMemoryTupleStore};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new(Box::new(InMemoryTupleStore::new()));
//!
//! client.write_relation_config(
//!     "document",
//!     "viewer",
//!     RelationConfig::new().with_directly_assignable_types(vec!["user".to_string()]),
//! );
//!
//! client
//!     .add_tuple(Tuple::new("document", "doc1", "viewer", "user", "alice"))
//!     .await?;
//!
//! let allowed = client
//!     .check(&CheckRequest::new("document", "doc1", "viewer", "user", "alice"))
//!     .await?;
//! assert!(allowed);
//! # Ok(())
//! # }
//! ```

pub mod check;
pub mod client;
pub mod condition;
pub mod error;
pub mod list;
pub mod model;
pub mod schema;
pub mod store;

pub use client::{Client, EngineConfig};
pub use error::{CoreError, Result};
pub use model::{CheckOptions, CheckRequest, Entity, Tuple, TupleIdentity, WILDCARD_SUBJECT_ID};
pub use schema::{
    ConditionDefinition, IntersectionOperand, ParamType, RelationConfig, SchemaRegistry,
    SchemaWarning, TupleToUsersetDef,
};
pub use store::{seeded_store, InMemoryTupleStore, TupleStore};
