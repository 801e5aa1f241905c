// Trusted-data gate: classifies a tool result as trusted or untrusted

use crate::core::models::{TrustDecision, TrustedDataPolicy};
use crate::engine::{json_path, operators};
use serde_json::Value;
use tracing::warn;

pub const NO_POLICY_REASON: &str = "no applicable trusted-data policy matched";

/// Classify a tool result against the applicable trusted-data policies.
///
/// A result is trusted iff at least one policy matches, where a policy
/// matches iff its attribute path yields at least one leaf and every leaf
/// satisfies the operator. Untrusted results are routed to dual-LLM
/// sanitisation; `is_blocked` stays reserved for an explicit block action
/// on a future policy row shape.
pub fn evaluate(policies: &[TrustedDataPolicy], result: &Value) -> TrustDecision {
    for policy in policies {
        if policy_matches(policy, result) {
            return TrustDecision::trusted(policy.description.clone());
        }
    }
    TrustDecision::untrusted(NO_POLICY_REASON.to_string())
}

fn policy_matches(policy: &TrustedDataPolicy, result: &Value) -> bool {
    let leaves = match json_path::extract(result, &policy.attribute_path) {
        Ok(leaves) => leaves,
        Err(e) => {
            warn!(
                policy_id = %policy.id,
                path = %policy.attribute_path,
                error = %e,
                "Skipping trusted-data policy with malformed path"
            );
            return false;
        }
    };

    // Zero leaves never trust.
    if leaves.is_empty() {
        return false;
    }

    leaves.iter().all(|leaf| {
        operators::evaluate(policy.operator, leaf, &policy.value).unwrap_or(false)
    })
}
