//! Offline approval chain evaluation.
//!
//! Reads a JSON document holding an `approvals` array and an optional
//! `decision`, then reports what the chain looks like before and after that
//! decision. Nothing touches the database.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use eapproval_core::approvals::{self, Decision};
use eapproval_core::{ApprovalRecord, UserId};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::CommandResult;

const COMMAND: &str = "evaluate";

#[derive(Debug, Deserialize)]
struct EvaluationInput {
    approvals: Vec<ApprovalRecord>,
    #[serde(default)]
    decision: Option<ProposedDecision>,
}

#[derive(Debug, Deserialize)]
struct ProposedDecision {
    level: u32,
    decision: Decision,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChainReport {
    overall_status: String,
    current_level: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    actionable_level: Option<u32>,
    approvals: Vec<ApprovalRecord>,
}

impl ChainReport {
    fn of(chain: Vec<ApprovalRecord>, approver: Option<&UserId>) -> Self {
        Self {
            overall_status: approvals::overall_status(&chain).to_string(),
            current_level: approvals::current_level(&chain),
            actionable_level: approver.and_then(|approver| approvals::can_act(&chain, approver)),
            approvals: chain,
        }
    }
}

pub fn run(path: &Path, approver: Option<&str>) -> CommandResult {
    let input = match read_input(path) {
        Ok(input) => input,
        Err(error) => {
            return CommandResult::failure(COMMAND, "input_invalid", format!("{error:#}"), 2)
        }
    };

    if let Err(error) = approvals::validate_chain(&input.approvals) {
        return CommandResult::failure(COMMAND, "chain_invalid", error.to_string(), 3);
    }

    let approver = approver.map(UserId::from);
    let before = ChainReport::of(input.approvals.clone(), approver.as_ref());

    let Some(proposed) = input.decision else {
        let message = format!(
            "chain is {} at level {}",
            before.overall_status,
            level_label(before.current_level)
        );
        return CommandResult::success_with_data(COMMAND, message, Some(json!({ "chain": before })));
    };

    match approvals::apply_decision(
        &input.approvals,
        proposed.level,
        proposed.decision,
        proposed.reason.as_deref(),
    ) {
        Ok(decided) => {
            let after = ChainReport::of(decided, approver.as_ref());
            let message = format!(
                "level {} {:?}: chain moved from {} to {}",
                proposed.level, proposed.decision, before.overall_status, after.overall_status
            );
            CommandResult::success_with_data(
                COMMAND,
                message,
                Some(json!({ "chain": before, "decided": after })),
            )
        }
        Err(refusal) => {
            CommandResult::failure(COMMAND, "transition_refused", refusal.to_string(), 4)
        }
    }
}

fn read_input(path: &Path) -> Result<EvaluationInput> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid evaluation document", path.display()))
}

fn level_label(level: Option<u32>) -> String {
    level.map(|level| level.to_string()).unwrap_or_else(|| "-".to_string())
}
