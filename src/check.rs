//! The check evaluator: the recursive, graph-walking decision procedure
//! at the center of the crate.
//!
//! `check` never raises for a denied decision. Depth exhaustion, cycles,
//! missing schema, and condition failures all fold into `false`.
//! The only way `check` itself surfaces an error is a store I/O failure.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;

use tracing::debug;

use crate::condition;
use crate::model::{CheckOptions, CheckRequest, Tuple};
use crate::schema::{IntersectionOperand, SchemaRegistry};
use crate::store::TupleStore;

/// Recursive decision procedure over a tuple store and schema registry.
/// Stateless between calls; the visited set and depth counter in
/// `check_recursive` are call-local.
pub struct CheckEvaluator<'a> {
    store: &'a dyn TupleStore,
    schema: &'a SchemaRegistry,
}

impl<'a> CheckEvaluator<'a> {
    pub fn new(store: &'a dyn TupleStore, schema: &'a SchemaRegistry) -> Self {
        Self { store, schema }
    }

    /// `check(store, schema, request, options) -> bool`. Returns
    /// `Ok(false)`, never an error, for denials; `Err` only for store I/O
    /// failure.
    pub async fn check(&self, request: &CheckRequest, options: CheckOptions) -> anyhow::Result<bool> {
        let mut visited = HashSet::new();
        self.check_recursive(
            &request.object_type,
            &request.object_id,
            &request.relation,
            &request.subject_type,
            &request.subject_id,
            request.subject_relation.as_deref(),
            &request.context,
            &mut visited,
            0,
            options.max_depth,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    fn check_recursive<'f>(
        &'f self,
        object_type: &'f str,
        object_id: &'f str,
        relation: &'f str,
        subject_type: &'f str,
        subject_id: &'f str,
        subject_relation: Option<&'f str>,
        context: &'f HashMap<String, serde_json::Value>,
        visited: &'f mut HashSet<String>,
        depth: u32,
        max_depth: u32,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + 'f>> {
        Box::pin(async move {
            // Depth guard: scoped to this call only.
            if depth >= max_depth {
                debug!(object_type, object_id, relation, depth, "max depth exceeded");
                return Ok(false);
            }

            // Cycle guard: visited set keyed on (object_type, object_id, relation),
            // pushed on entry and popped on exit. A path set, not a memo.
            let visit_key = format!("{object_type}:{object_id}#{relation}");
            if visited.contains(&visit_key) {
                debug!(object_type, object_id, relation, "cycle detected");
                return Ok(false);
            }
            visited.insert(visit_key.clone());

            let result = self
                .decide(
                    object_type,
                    object_id,
                    relation,
                    subject_type,
                    subject_id,
                    subject_relation,
                    context,
                    visited,
                    depth,
                    max_depth,
                )
                .await;

            visited.remove(&visit_key);
            result
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn decide<'f>(
        &'f self,
        object_type: &'f str,
        object_id: &'f str,
        relation: &'f str,
        subject_type: &'f str,
        subject_id: &'f str,
        subject_relation: Option<&'f str>,
        context: &'f HashMap<String, serde_json::Value>,
        visited: &'f mut HashSet<String>,
        depth: u32,
        max_depth: u32,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + 'f>> {
        Box::pin(async move {
            debug!(object_type, object_id, relation, subject_type, subject_id, depth, "check");

            let config = self.schema.find_relation_config(object_type, relation);

            // Steps 1-3: direct tuple, wildcard, userset-subject membership.
            // These apply unconditionally, independent of any rewrite config.
            let mut positive = self
                .direct_check(
                    object_type,
                    object_id,
                    relation,
                    subject_type,
                    subject_id,
                    subject_relation,
                    context,
                    visited,
                    depth,
                    max_depth,
                )
                .await?;

            if !positive {
                if let Some(config) = config {
                    // The schema permits `computed_userset` alongside sibling
                    // composition fields with unspecified interaction.
                    // `computed_userset` is treated as a standalone rewrite
                    // when present; implied_by, tuple_to_userset, and
                    // intersection on the same config are ignored in that
                    // case.
                    if let Some(rewrite) = &config.computed_userset {
                        positive = self
                            .check_recursive(
                                object_type,
                                object_id,
                                rewrite,
                                subject_type,
                                subject_id,
                                subject_relation,
                                context,
                                visited,
                                depth + 1,
                                max_depth,
                            )
                            .await?;
                    } else {
                        // Step 5: implied-by union.
                        for sibling in config.implied_by.iter().flatten() {
                            if self
                                .check_recursive(
                                    object_type,
                                    object_id,
                                    sibling,
                                    subject_type,
                                    subject_id,
                                    subject_relation,
                                    context,
                                    visited,
                                    depth + 1,
                                    max_depth,
                                )
                                .await?
                            {
                                positive = true;
                                break;
                            }
                        }

                        // Step 6: tuple-to-userset.
                        if !positive {
                            for ttu in config.tuple_to_userset.iter().flatten() {
                                if self
                                    .follow_tuple_to_userset(
                                        object_type,
                                        object_id,
                                        &ttu.tupleset,
                                        &ttu.computed_userset,
                                        subject_type,
                                        subject_id,
                                        subject_relation,
                                        context,
                                        visited,
                                        depth,
                                        max_depth,
                                    )
                                    .await?
                                {
                                    positive = true;
                                }
                            }
                        }

                        // Step 7: intersection (ALL operands, left-to-right,
                        // short-circuit on first false).
                        if !positive {
                            if let Some(operands) = &config.intersection {
                                positive = self
                                    .evaluate_intersection(
                                        object_type,
                                        object_id,
                                        relation,
                                        operands,
                                        subject_type,
                                        subject_id,
                                        subject_relation,
                                        context,
                                        visited,
                                        depth,
                                        max_depth,
                                    )
                                    .await?;
                            }
                        }
                    }
                }
            }

            // Step 8: exclusion, applied last, defeats every positive branch.
            if positive {
                if let Some(config) = config {
                    if let Some(excluded_by) = &config.excluded_by {
                        let excluded = self
                            .check_recursive(
                                object_type,
                                object_id,
                                excluded_by,
                                subject_type,
                                subject_id,
                                subject_relation,
                                context,
                                visited,
                                depth + 1,
                                max_depth,
                            )
                            .await?;
                        if excluded {
                            return Ok(false);
                        }
                    }
                }
            }

            Ok(positive)
        })
    }

    /// Steps 1-3: direct tuple existence, type-wildcard, and userset-subject
    /// membership expansion, restricted to this object/relation's own
    /// direct tuples, independent of any rewrite config. Also the `direct`
    /// operand of an intersection.
    #[allow(clippy::too_many_arguments)]
    fn direct_check<'f>(
        &'f self,
        object_type: &'f str,
        object_id: &'f str,
        relation: &'f str,
        subject_type: &'f str,
        subject_id: &'f str,
        subject_relation: Option<&'f str>,
        context: &'f HashMap<String, serde_json::Value>,
        visited: &'f mut HashSet<String>,
        depth: u32,
        max_depth: u32,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + 'f>> {
        Box::pin(async move {
            // Step 1: trivial hit.
            if let Some(rel) = subject_relation {
                let usersets = self
                    .store
                    .find_userset_tuples(object_type, object_id, relation)
                    .await?;
                for tuple in &usersets {
                    if tuple.subject_type == subject_type
                        && tuple.subject_id == subject_id
                        && tuple.subject_relation.as_deref() == Some(rel)
                        && self.condition_passes(tuple, context).await
                    {
                        return Ok(true);
                    }
                }
            } else {
                if let Some(tuple) = self
                    .store
                    .find_direct_tuple(object_type, object_id, relation, subject_type, subject_id)
                    .await?
                {
                    if self.condition_passes(&tuple, context).await {
                        return Ok(true);
                    }
                }

                // Step 2: type-wildcard direct hit (only when subject id isn't itself "*").
                if subject_id != crate::model::WILDCARD_SUBJECT_ID {
                    let allows_wildcard = self
                        .schema
                        .find_relation_config(object_type, relation)
                        .map(|config| config.accepts_subject_type(&format!("{subject_type}:*")))
                        .unwrap_or(false);

                    if allows_wildcard {
                        if let Some(tuple) = self
                            .store
                            .find_direct_tuple(
                                object_type,
                                object_id,
                                relation,
                                subject_type,
                                crate::model::WILDCARD_SUBJECT_ID,
                            )
                            .await?
                        {
                            if self.condition_passes(&tuple, context).await {
                                return Ok(true);
                            }
                        }
                    }
                }
            }

            // Step 3: userset-subject membership. Recurse through every
            // userset tuple stored directly on this object/relation.
            let usersets = self
                .store
                .find_userset_tuples(object_type, object_id, relation)
                .await?;
            for tuple in usersets {
                if !self.condition_passes(&tuple, context).await {
                    continue;
                }
                let Some(userset_relation) = tuple.subject_relation.clone() else {
                    continue;
                };
                if self
                    .check_recursive(
                        &tuple.subject_type,
                        &tuple.subject_id,
                        &userset_relation,
                        subject_type,
                        subject_id,
                        subject_relation,
                        context,
                        visited,
                        depth + 1,
                        max_depth,
                    )
                    .await?
                {
                    return Ok(true);
                }
            }

            Ok(false)
        })
    }

    /// Step 6 / intersection `tupleToUserset`: follow direct tuples on
    /// `tupleset` to referenced objects, then check `computed_userset` on
    /// each.
    #[allow(clippy::too_many_arguments)]
    fn follow_tuple_to_userset<'f>(
        &'f self,
        object_type: &'f str,
        object_id: &'f str,
        tupleset: &'f str,
        computed_userset: &'f str,
        subject_type: &'f str,
        subject_id: &'f str,
        subject_relation: Option<&'f str>,
        context: &'f HashMap<String, serde_json::Value>,
        visited: &'f mut HashSet<String>,
        depth: u32,
        max_depth: u32,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + 'f>> {
        Box::pin(async move {
            let referenced = self
                .store
                .find_tuples_by_relation(object_type, object_id, tupleset)
                .await?;

            for tuple in referenced {
                if !self.condition_passes(&tuple, context).await {
                    continue;
                }
                if self
                    .check_recursive(
                        &tuple.subject_type,
                        &tuple.subject_id,
                        computed_userset,
                        subject_type,
                        subject_id,
                        subject_relation,
                        context,
                        visited,
                        depth + 1,
                        max_depth,
                    )
                    .await?
                {
                    return Ok(true);
                }
            }

            Ok(false)
        })
    }

    /// Step 7: intersection. Operands are evaluated left-to-right,
    /// short-circuiting on the first `false`. Deterministic order keeps
    /// condition-evaluation side effects, and thus error reproducibility,
    /// stable.
    #[allow(clippy::too_many_arguments)]
    async fn evaluate_intersection<'f>(
        &'f self,
        object_type: &'f str,
        object_id: &'f str,
        relation: &'f str,
        operands: &'f [IntersectionOperand],
        subject_type: &'f str,
        subject_id: &'f str,
        subject_relation: Option<&'f str>,
        context: &'f HashMap<String, serde_json::Value>,
        visited: &'f mut HashSet<String>,
        depth: u32,
        max_depth: u32,
    ) -> anyhow::Result<bool> {
        for operand in operands {
            let holds = match operand {
                IntersectionOperand::Direct => {
                    self.direct_check(
                        object_type,
                        object_id,
                        relation,
                        subject_type,
                        subject_id,
                        subject_relation,
                        context,
                        visited,
                        depth,
                        max_depth,
                    )
                    .await?
                }
                IntersectionOperand::ComputedUserset { relation: rewrite } => {
                    self.check_recursive(
                        object_type,
                        object_id,
                        rewrite,
                        subject_type,
                        subject_id,
                        subject_relation,
                        context,
                        visited,
                        depth + 1,
                        max_depth,
                    )
                    .await?
                }
                IntersectionOperand::TupleToUserset {
                    tupleset,
                    computed_userset,
                } => {
                    self.follow_tuple_to_userset(
                        object_type,
                        object_id,
                        tupleset,
                        computed_userset,
                        subject_type,
                        subject_id,
                        subject_relation,
                        context,
                        visited,
                        depth,
                        max_depth,
                    )
                    .await?
                }
            };
            if !holds {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Merges `tuple.condition_context` with the request context (request
    /// wins on conflict) and evaluates the named condition. Any failure,
    /// whether a missing definition, a type error, or an expression error,
    /// drops the tuple rather than surfacing a decision error.
    async fn condition_passes(
        &self,
        tuple: &Tuple,
        request_context: &HashMap<String, serde_json::Value>,
    ) -> bool {
        let Some(name) = &tuple.condition_name else {
            return true;
        };

        let Some(definition) = self.schema.find_condition_definition(name) else {
            debug!(condition = %name, "condition definition not found, dropping tuple");
            return false;
        };

        let mut merged = tuple.condition_context.clone().unwrap_or_default();
        for (k, v) in request_context {
            merged.insert(k.clone(), v.clone());
        }

        match condition::evaluate(definition, &merged) {
            Ok(passes) => passes,
            Err(err) => {
                debug!(condition = %name, error = %err, "condition evaluation failed, dropping tuple");
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::CheckRequest;
    use crate::schema::{ParamType, RelationConfig};
    use crate::store::seeded_store;

    fn request(object_id: &str, relation: &str, subject_id: &str) -> CheckRequest {
        CheckRequest::new("document", object_id, relation, "user", subject_id)
    }

    #[tokio::test]
    async fn direct_tuple_grants() {
        let store = seeded_store([Tuple::new("document", "doc1", "viewer", "user", "alice")])
            .await
            .unwrap();
        let schema = SchemaRegistry::new();
        let evaluator = CheckEvaluator::new(&store, &schema);
        assert!(evaluator
            .check(&request("doc1", "viewer", "alice"), CheckOptions::default())
            .await
            .unwrap());
        assert!(!evaluator
            .check(&request("doc1", "viewer", "bob"), CheckOptions::default())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn userset_subject_expands_group_membership() {
        let store = seeded_store([
            Tuple::new("document", "doc1", "viewer", "group", "eng").userset("member"),
            Tuple::new("group", "eng", "member", "user", "alice"),
        ])
        .await
        .unwrap();
        let schema = SchemaRegistry::new();
        let evaluator = CheckEvaluator::new(&store, &schema);
        assert!(evaluator
            .check(&request("doc1", "viewer", "alice"), CheckOptions::default())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn implied_by_union_cascades() {
        let store = seeded_store([Tuple::new("document", "doc1", "editor", "user", "alice")])
            .await
            .unwrap();
        let mut schema = SchemaRegistry::new();
        schema.upsert_relation_config(
            "document",
            "viewer",
            RelationConfig::new().with_implied_by(vec!["editor".to_string()]),
        );
        let evaluator = CheckEvaluator::new(&store, &schema);
        assert!(evaluator
            .check(&request("doc1", "viewer", "alice"), CheckOptions::default())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn tuple_to_userset_follows_parent() {
        let store = seeded_store([
            Tuple::new("document", "doc1", "parent", "folder", "f1"),
            Tuple::new("folder", "f1", "viewer", "user", "alice"),
        ])
        .await
        .unwrap();
        let mut schema = SchemaRegistry::new();
        schema.upsert_relation_config(
            "document",
            "viewer",
            RelationConfig::new().with_tuple_to_userset(vec![crate::schema::TupleToUsersetDef {
                tupleset: "parent".to_string(),
                computed_userset: "viewer".to_string(),
            }]),
        );
        let evaluator = CheckEvaluator::new(&store, &schema);
        assert!(evaluator
            .check(&request("doc1", "viewer", "alice"), CheckOptions::default())
            .await
            .unwrap());
        assert!(!evaluator
            .check(&request("doc1", "viewer", "bob"), CheckOptions::default())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn intersection_requires_all_operands() {
        let store = seeded_store([Tuple::new("document", "doc1", "member", "user", "alice")])
            .await
            .unwrap();
        let mut schema = SchemaRegistry::new();
        schema.upsert_relation_config(
            "document",
            "approver",
            RelationConfig::new().with_intersection(vec![
                crate::schema::IntersectionOperand::Direct,
                crate::schema::IntersectionOperand::ComputedUserset {
                    relation: "member".to_string(),
                },
            ]),
        );
        let evaluator = CheckEvaluator::new(&store, &schema);
        // "alice" has `member` but no direct `approver` tuple, so the
        // intersection's `Direct` operand fails and the whole thing denies.
        assert!(!evaluator
            .check(&request("doc1", "approver", "alice"), CheckOptions::default())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn exclusion_defeats_union() {
        let store = seeded_store([
            Tuple::new("document", "doc1", "viewer", "user", "alice"),
            Tuple::new("document", "doc1", "banned", "user", "alice"),
        ])
        .await
        .unwrap();
        let mut schema = SchemaRegistry::new();
        schema.upsert_relation_config(
            "document",
            "viewer",
            RelationConfig::new().with_excluded_by("banned"),
        );
        let evaluator = CheckEvaluator::new(&store, &schema);
        assert!(!evaluator
            .check(&request("doc1", "viewer", "alice"), CheckOptions::default())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn wildcard_grants_when_relation_allows_it() {
        let store = seeded_store([Tuple::new("document", "doc1", "viewer", "user", "*")])
            .await
            .unwrap();
        let mut schema = SchemaRegistry::new();
        schema.upsert_relation_config(
            "document",
            "viewer",
            RelationConfig::new().with_directly_assignable_types(vec!["user:*".to_string()]),
        );
        let evaluator = CheckEvaluator::new(&store, &schema);
        assert!(evaluator
            .check(&request("doc1", "viewer", "alice"), CheckOptions::default())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn depth_limit_denies_instead_of_erroring() {
        let store = seeded_store([Tuple::new("document", "doc1", "editor", "user", "alice")])
            .await
            .unwrap();
        let mut schema = SchemaRegistry::new();
        schema.upsert_relation_config(
            "document",
            "viewer",
            RelationConfig::new().with_implied_by(vec!["editor".to_string()]),
        );
        let evaluator = CheckEvaluator::new(&store, &schema);
        let options = CheckOptions { max_depth: 0 };
        assert!(!evaluator
            .check(&request("doc1", "viewer", "alice"), options)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn conditional_tuple_requires_context() {
        let mut ctx = HashMap::new();
        ctx.insert("subresources".to_string(), serde_json::json!(["dashboard"]));
        let store = seeded_store([
            Tuple::new("document", "doc1", "viewer", "user", "alice").with_condition(
                "subresource_filter",
                ctx,
            ),
        ])
        .await
        .unwrap();
        let mut schema = SchemaRegistry::new();
        let mut params = HashMap::new();
        params.insert("subresource".to_string(), ParamType::String);
        params.insert("subresources".to_string(), ParamType::List);
        schema.upsert_condition_definition(crate::schema::ConditionDefinition::new(
            "subresource_filter",
            params,
            "subresource in subresources",
        ));
        let evaluator = CheckEvaluator::new(&store, &schema);

        let mut allow_ctx = HashMap::new();
        allow_ctx.insert("subresource".to_string(), serde_json::json!("dashboard"));
        let allow = request("doc1", "viewer", "alice").with_context(allow_ctx);
        assert!(evaluator.check(&allow, CheckOptions::default()).await.unwrap());

        let mut deny_ctx = HashMap::new();
        deny_ctx.insert("subresource".to_string(), serde_json::json!("alert-rule"));
        let deny = request("doc1", "viewer", "alice").with_context(deny_ctx);
        assert!(!evaluator.check(&deny, CheckOptions::default()).await.unwrap());
    }
}
