//! Sequential multi-level approval chain evaluation.
//!
//! Every function here is a pure reducer over a request's approval records.
//! Levels are 1-based and must be decided strictly in order: a level can only
//! leave `Pending` once every lower level is `Approved`, and a rejection
//! freezes the chain without touching the levels approved before it.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::approval::{ApprovalRecord, ApprovalStatus, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    fn status(self) -> ApprovalStatus {
        match self {
            Self::Approved => ApprovalStatus::Approved,
            Self::Rejected => ApprovalStatus::Rejected,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionViolation {
    UnknownLevel,
    AlreadyResolved { status: ApprovalStatus },
    OutOfOrder { blocking_level: u32, blocking_status: ApprovalStatus },
    MissingReason,
    NotActionable { approver_id: UserId },
}

impl fmt::Display for TransitionViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownLevel => f.write_str("level does not exist"),
            Self::AlreadyResolved { status } => write!(f, "level is already {status}"),
            Self::OutOfOrder { blocking_level, blocking_status } => {
                write!(f, "level {blocking_level} is still {blocking_status}")
            }
            Self::MissingReason => f.write_str("a rejection requires a reason"),
            Self::NotActionable { approver_id } => {
                write!(f, "approver `{approver_id}` has no level awaiting their decision")
            }
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("invalid transition at level {level}: {violation}")]
pub struct InvalidTransition {
    pub level: u32,
    pub violation: TransitionViolation,
}

impl InvalidTransition {
    fn new(level: u32, violation: TransitionViolation) -> Self {
        Self { level, violation }
    }

    /// Raised when an approver asks to decide but `can_act` finds nothing for them.
    ///
    /// Reports the approver's own level when they hold one, otherwise the
    /// level the chain stopped at.
    pub fn not_actionable(approvals: &[ApprovalRecord], approver_id: &UserId) -> Self {
        let ordered = in_level_order(approvals);
        let own = ordered
            .iter()
            .filter(|record| record.is_assigned_to(approver_id))
            .find(|record| record.status != ApprovalStatus::Approved)
            .or_else(|| ordered.iter().find(|record| record.is_assigned_to(approver_id)));
        let level = own
            .or_else(|| ordered.iter().find(|record| record.status != ApprovalStatus::Approved))
            .or_else(|| ordered.last())
            .map_or(1, |record| record.level);

        Self::new(level, TransitionViolation::NotActionable { approver_id: approver_id.clone() })
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChainShapeError {
    #[error("approval chain must contain at least one level")]
    Empty,
    #[error("approval level at position {position} must be {expected}, found {found}")]
    NonSequentialLevel { position: usize, expected: u32, found: u32 },
    #[error("level {level} is {status} although level {blocking_level} is unresolved or rejected")]
    ResolvedAfterUnresolved { level: u32, status: ApprovalStatus, blocking_level: u32 },
    #[error("level {level} has no approver assigned")]
    UnassignedLevel { level: u32 },
    #[error("level {level} must start out Pending, found {status}")]
    NotFresh { level: u32, status: ApprovalStatus },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproverAssignment {
    pub approver_id: UserId,
    #[serde(default)]
    pub approver_name: Option<String>,
}

/// Returns the level `approver_id` may decide right now, if any.
///
/// Only the first non-approved level is ever actionable, so an approver on a
/// later level waits even when the blocking level belongs to someone else.
pub fn can_act(approvals: &[ApprovalRecord], approver_id: &UserId) -> Option<u32> {
    let candidate = first_unapproved(approvals)?;
    (candidate.status == ApprovalStatus::Pending && candidate.is_assigned_to(approver_id))
        .then_some(candidate.level)
}

pub fn apply_decision(
    approvals: &[ApprovalRecord],
    level: u32,
    decision: Decision,
    reason: Option<&str>,
) -> Result<Vec<ApprovalRecord>, InvalidTransition> {
    let target = approvals
        .iter()
        .find(|record| record.level == level)
        .ok_or_else(|| InvalidTransition::new(level, TransitionViolation::UnknownLevel))?;

    if target.status.is_resolved() {
        return Err(InvalidTransition::new(
            level,
            TransitionViolation::AlreadyResolved { status: target.status },
        ));
    }

    if let Some(blocking) = in_level_order(approvals)
        .into_iter()
        .take_while(|record| record.level < level)
        .find(|record| record.status != ApprovalStatus::Approved)
    {
        return Err(InvalidTransition::new(
            level,
            TransitionViolation::OutOfOrder {
                blocking_level: blocking.level,
                blocking_status: blocking.status,
            },
        ));
    }

    let reason = match decision {
        Decision::Approved => None,
        Decision::Rejected => {
            let reason = reason.map(str::trim).filter(|reason| !reason.is_empty());
            Some(
                reason
                    .ok_or_else(|| {
                        InvalidTransition::new(level, TransitionViolation::MissingReason)
                    })?
                    .to_string(),
            )
        }
    };

    Ok(approvals
        .iter()
        .map(|record| {
            if record.level != level {
                return record.clone();
            }
            ApprovalRecord { status: decision.status(), reason: reason.clone(), ..record.clone() }
        })
        .collect())
}

pub fn overall_status(approvals: &[ApprovalRecord]) -> ApprovalStatus {
    if approvals.iter().any(|record| record.status == ApprovalStatus::Rejected) {
        return ApprovalStatus::Rejected;
    }

    if !approvals.is_empty()
        && approvals.iter().all(|record| record.status == ApprovalStatus::Approved)
    {
        return ApprovalStatus::Approved;
    }

    ApprovalStatus::Pending
}

/// The 1-based level awaiting a decision, or `None` once the chain is terminal.
pub fn current_level(approvals: &[ApprovalRecord]) -> Option<u32> {
    first_unapproved(approvals)
        .filter(|record| record.status == ApprovalStatus::Pending)
        .map(|record| record.level)
}

pub fn is_terminal(approvals: &[ApprovalRecord]) -> bool {
    overall_status(approvals).is_resolved()
}

/// Checks dense 1..N numbering and the prefix/rejection/pending shape.
pub fn validate_chain(approvals: &[ApprovalRecord]) -> Result<(), ChainShapeError> {
    if approvals.is_empty() {
        return Err(ChainShapeError::Empty);
    }

    let mut blocking_level = None;
    for (position, record) in approvals.iter().enumerate() {
        let expected = position as u32 + 1;
        if record.level != expected {
            return Err(ChainShapeError::NonSequentialLevel {
                position,
                expected,
                found: record.level,
            });
        }

        match (blocking_level, record.status) {
            (None, ApprovalStatus::Approved) => {}
            (None, _) => blocking_level = Some(record.level),
            (Some(_), ApprovalStatus::Pending) => {}
            (Some(blocking_level), status) => {
                return Err(ChainShapeError::ResolvedAfterUnresolved {
                    level: record.level,
                    status,
                    blocking_level,
                });
            }
        }
    }

    Ok(())
}

/// Builds the all-`Pending` chain a request starts with.
pub fn fresh_chain(
    assignments: Vec<ApproverAssignment>,
) -> Result<Vec<ApprovalRecord>, ChainShapeError> {
    if assignments.is_empty() {
        return Err(ChainShapeError::Empty);
    }

    assignments
        .into_iter()
        .enumerate()
        .map(|(position, assignment)| {
            let level = position as u32 + 1;
            let approver_id = assignment.approver_id.0.trim().to_string();
            if approver_id.is_empty() {
                return Err(ChainShapeError::UnassignedLevel { level });
            }

            let mut record = ApprovalRecord::pending(level, approver_id);
            record.approver_name = assignment
                .approver_name
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty());
            Ok(record)
        })
        .collect()
}

/// Rejects a persisted or submitted chain that is not a fresh submission.
pub fn ensure_fresh(approvals: &[ApprovalRecord]) -> Result<(), ChainShapeError> {
    validate_chain(approvals)?;
    for record in approvals {
        if record.approver_id.as_ref().map(|id| id.0.trim().is_empty()).unwrap_or(true) {
            return Err(ChainShapeError::UnassignedLevel { level: record.level });
        }
        if record.status != ApprovalStatus::Pending {
            return Err(ChainShapeError::NotFresh { level: record.level, status: record.status });
        }
    }
    Ok(())
}

fn in_level_order(approvals: &[ApprovalRecord]) -> Vec<&ApprovalRecord> {
    let mut ordered: Vec<&ApprovalRecord> = approvals.iter().collect();
    ordered.sort_by_key(|record| record.level);
    ordered
}

fn first_unapproved(approvals: &[ApprovalRecord]) -> Option<&ApprovalRecord> {
    in_level_order(approvals).into_iter().find(|record| record.status != ApprovalStatus::Approved)
}
