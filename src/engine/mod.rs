// Policy evaluation engine: pure predicates, path extraction, the two gates

pub mod json_path;
pub mod operators;
pub mod tool_invocation;
pub mod trusted_data;
