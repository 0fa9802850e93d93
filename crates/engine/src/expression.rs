//! Expression resolution over the ambiance stack
//!
//! Small placeholder resolver for skip conditions and parameter strings.
//! Expressions reference the context with `${...}` placeholders:
//!
//!   ${setup.<key>}          setup abstraction (account/org/project style)
//!   ${plan_execution_id}    the running plan execution
//!   ${level.runtime_id}     innermost level fields
//!   ${level.setup_id}
//!   ${level.group}
//!
//! Resolution is a free function over the ambiance value; there is no shared
//! mutable state to synchronize.

use ibai_core::Ambiance;

/// Replace every known placeholder in `expression`. Unknown placeholders are
/// left verbatim so callers can spot them in logs.
pub fn resolve(ambiance: &Ambiance, expression: &str) -> String {
    let mut resolved = String::with_capacity(expression.len());
    let mut rest = expression;

    while let Some(start) = rest.find("${") {
        resolved.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match lookup(ambiance, key) {
                    Some(value) => resolved.push_str(&value),
                    None => {
                        resolved.push_str("${");
                        resolved.push_str(key);
                        resolved.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                resolved.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    resolved.push_str(rest);
    resolved
}

/// Evaluate a skip condition: resolve placeholders and compare with "true".
pub fn evaluate_skip_condition(ambiance: &Ambiance, condition: &str) -> bool {
    resolve(ambiance, condition).trim().eq_ignore_ascii_case("true")
}

fn lookup(ambiance: &Ambiance, key: &str) -> Option<String> {
    if let Some(setup_key) = key.strip_prefix("setup.") {
        return ambiance.setup_abstraction(setup_key).map(str::to_string);
    }
    match key {
        "plan_execution_id" => Some(ambiance.plan_execution_id.to_string()),
        "plan_id" => Some(ambiance.plan_id.to_string()),
        "level.runtime_id" => ambiance.obtain_current_runtime_id().map(|id| id.to_string()),
        "level.setup_id" => ambiance.obtain_current_setup_id().map(str::to_string),
        "level.group" => ambiance.current_level().map(|l| l.group.clone()),
        _ => None,
    }
}
