// Tool-invocation gate: allow/deny over an assistant-proposed tool call

use crate::core::models::{InvocationDecision, PolicyAction, ToolInvocationPolicy};
use crate::engine::{json_path, operators};
use serde_json::Value;
use tracing::debug;

/// Evaluate the applicable policies against decoded tool arguments.
///
/// Policies are walked in store order; the first denial wins. Allow policies
/// are conjunctive (every one must match), block policies fire on any match.
/// An allow policy whose argument is absent denies (fail-closed); a block
/// policy whose argument is absent is skipped, since a block rule cannot fire
/// on a value that does not exist.
pub fn evaluate(
    policies: &[ToolInvocationPolicy],
    arguments: &Value,
) -> InvocationDecision {
    for policy in policies {
        let value = json_path::lookup_scalar(arguments, &policy.argument_name);

        let value = match (value, policy.action) {
            (Some(v), _) => v,
            (None, PolicyAction::Block) => continue,
            (None, PolicyAction::Allow) => {
                return InvocationDecision::Denied {
                    reason: format!(
                        "Missing required argument: {}",
                        policy.argument_name
                    ),
                };
            }
        };

        let matched = match operators::evaluate(policy.operator, value, &policy.value) {
            Some(m) => m,
            // Unevaluable policy (bad regex): skipped, never a failure.
            None => continue,
        };

        match policy.action {
            PolicyAction::Block if matched => {
                return InvocationDecision::Denied {
                    reason: deny_reason(policy),
                };
            }
            PolicyAction::Allow if !matched => {
                return InvocationDecision::Denied {
                    reason: deny_reason(policy),
                };
            }
            _ => {
                debug!(policy_id = %policy.id, "Tool-invocation policy passed");
            }
        }
    }

    InvocationDecision::Allowed
}

fn deny_reason(policy: &ToolInvocationPolicy) -> String {
    match &policy.block_prompt {
        Some(prompt) if !prompt.is_empty() => prompt.clone(),
        _ => format!("Policy violation: {}", policy.description),
    }
}
