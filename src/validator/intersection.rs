//! Intersection Combinator
//!
//! `allOf`: a value is accepted only when every branch accepts it. Unlike
//! the union combinators this never short-circuits. All branches run and
//! their errors are concatenated, so one pass reports every violated
//! constraint.
//!
//! Branches are checked with unknown-key stripping forced on. Two object
//! branches that each declare part of the properties would otherwise reject
//! each other's keys.

use serde_json::Value;

use super::{Checked, ValidateOptions, ValidatorGraph, ValidatorId};

/// One slot of an intersection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllBranch {
    /// Unconditional branch
    Schema(ValidatorId),
    /// `then` applies when the value passes `is`, `otherwise` when it fails;
    /// a missing side skips the slot
    Conditional {
        is: ValidatorId,
        then: Option<ValidatorId>,
        otherwise: Option<ValidatorId>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Intersection {
    branches: Vec<AllBranch>,
}

impl Intersection {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn branch(mut self, schema: ValidatorId) -> Self {
        self.branches.push(AllBranch::Schema(schema));
        self
    }

    #[must_use]
    pub fn conditional(mut self, is: ValidatorId, then: Option<ValidatorId>, otherwise: Option<ValidatorId>) -> Self {
        self.branches.push(AllBranch::Conditional { is, then, otherwise });
        self
    }

    pub fn branches(&self) -> &[AllBranch] {
        &self.branches
    }

    pub(crate) fn evaluate(
        &self,
        graph: &ValidatorGraph,
        value: &Value,
        path: &str,
        _options: ValidateOptions,
    ) -> Checked {
        // Branches always strip; the caller's options cover nothing else
        let options = ValidateOptions { strip_unknown: true };

        let mut errors = Vec::new();
        for branch in &self.branches {
            let effective = match branch {
                AllBranch::Schema(id) => Some(*id),
                AllBranch::Conditional { is, then, otherwise } => {
                    let failed = graph.check(*is, Some(value), path, options).is_err();
                    if failed {
                        *otherwise
                    } else {
                        *then
                    }
                }
            };
            let Some(effective) = effective else {
                continue;
            };
            if let Err(branch_errors) = graph.check(effective, Some(value), path, options) {
                errors.extend(branch_errors);
            }
        }

        if errors.is_empty() {
            Ok(Some(value.clone()))
        } else {
            Err(errors)
        }
    }
}
