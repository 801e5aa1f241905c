// Prompt templates and placeholder substitution for the quarantine loop.
//
// Templates are untrusted strings from the config table: placeholders are
// replaced literally (no templating language) and oversized templates are
// rejected before they reach an LLM.

use crate::core::errors::GatewayError;
use crate::core::models::DualLlmConfig;

/// Upper bound on a single stored prompt template.
pub const MAX_PROMPT_BYTES: usize = 32 * 1024;

pub const DEFAULT_MAX_ROUNDS: i64 = 10;

pub const DEFAULT_MAIN_AGENT_PROMPT: &str = "\
You are helping with this user request: {{originalUserRequest}}

A tool has returned data that you are not allowed to read directly. A separate \
assistant has read it and will answer multiple-choice questions about it.

Ask one question at a time, in exactly this format:

QUESTION: <your question on one line>
OPTIONS:
0: <first option>
1: <second option>

Provide between 2 and 6 options. When you have learned enough to describe the \
tool result, reply with the single word DONE.";

pub const DEFAULT_QUARANTINED_AGENT_PROMPT: &str = "\
You are answering questions about the following tool result data:

{{toolResultData}}

Question: {{question}}
Options:
{{options}}

Reply with a JSON object of the form {\"answer\": <index>} where <index> is \
an integer between 0 and {{maxIndex}}. Do not output anything else.";

pub const DEFAULT_SUMMARY_PROMPT: &str = "\
The following question-and-answer transcript describes a tool result that \
could not be read directly:

{{qaText}}

Write a short factual summary of the tool result based only on the \
transcript. Do not speculate beyond what the answers establish.";

pub fn default_config() -> DualLlmConfig {
    DualLlmConfig {
        main_agent_prompt: DEFAULT_MAIN_AGENT_PROMPT.to_string(),
        quarantined_agent_prompt: DEFAULT_QUARANTINED_AGENT_PROMPT.to_string(),
        summary_prompt: DEFAULT_SUMMARY_PROMPT.to_string(),
        max_rounds: DEFAULT_MAX_ROUNDS,
    }
}

/// Literal placeholder replacement.
pub fn substitute(template: &str, replacements: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (placeholder, value) in replacements {
        out = out.replace(placeholder, value);
    }
    out
}

pub fn validate_config(config: &DualLlmConfig) -> Result<(), GatewayError> {
    if config.max_rounds < 1 {
        return Err(GatewayError::InvalidRequest(
            "maxRounds must be at least 1".to_string(),
        ));
    }
    for (name, prompt) in [
        ("mainAgentPrompt", &config.main_agent_prompt),
        ("quarantinedAgentPrompt", &config.quarantined_agent_prompt),
        ("summaryPrompt", &config.summary_prompt),
    ] {
        if prompt.len() > MAX_PROMPT_BYTES {
            return Err(GatewayError::InvalidRequest(format!(
                "{} exceeds the {} byte limit",
                name, MAX_PROMPT_BYTES
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitution_is_literal() {
        let out = substitute(
            "Q: {{question}} / max {{maxIndex}}",
            &[("{{question}}", "what {{maxIndex}}?"), ("{{maxIndex}}", "2")],
        );
        // Substitution runs in order; values are not re-scanned templates but
        // an earlier replacement can surface a later placeholder's text.
        assert_eq!(out, "Q: what 2? / max 2");
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&default_config()).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_rounds() {
        let mut config = default_config();
        config.max_rounds = 0;
        assert!(validate_config(&config).is_err());
    }
}
