//! Variable Interpolation
//!
//! Pure resolution of `${...}` and `{{...}}` placeholders against a
//! [`VariableContext`]. Reference forms, in precedence order when a name
//! could match several sources:
//!
//! 1. Built-in tokens (`RANDOM_ID`, `TIMESTAMP`, `DATE`, ...), computed at
//!    interpolation time — repeated interpolation of the same placeholder
//!    may legitimately yield different values
//! 2. Step output references (`step_id.key` or `step_id.nested.path`)
//! 3. Plain variables from the context map
//!
//! Unresolved placeholders pass through unchanged; interpolation is total
//! and never fails. Non-string values referenced from a string context are
//! serialized as canonical JSON (sorted object keys).

use chrono::{Datelike, Local, SecondsFormat, Timelike};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use uuid::Uuid;

use super::context::VariableContext;

static DOLLAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_.\-]+)?)\}")
        .expect("dollar placeholder pattern is valid")
});

static BRACE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_.\-]+)?)\s*\}\}")
        .expect("brace placeholder pattern is valid")
});

/// Interpolates all placeholders in a string.
pub fn interpolate(input: &str, ctx: &VariableContext) -> String {
    if !input.contains("${") && !input.contains("{{") {
        return input.to_string();
    }

    let pass = DOLLAR_PATTERN.replace_all(input, |caps: &Captures| resolve(&caps[0], &caps[1], ctx));
    BRACE_PATTERN
        .replace_all(&pass, |caps: &Captures| resolve(&caps[0], &caps[1], ctx))
        .into_owned()
}

/// Recursively interpolates every string inside a JSON value.
///
/// Used to resolve an entire action configuration tree before dispatch.
pub fn interpolate_value(input: &Value, ctx: &VariableContext) -> Value {
    match input {
        Value::String(s) => Value::String(interpolate(s, ctx)),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate_value(v, ctx)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| interpolate_value(v, ctx)).collect())
        }
        other => other.clone(),
    }
}

/// Resolves one placeholder name, falling back to the literal match text.
fn resolve(literal: &str, name: &str, ctx: &VariableContext) -> String {
    if let Some(value) = builtin(name) {
        return value;
    }

    if let Some((step_id, path)) = name.split_once('.') {
        if let Some(value) = ctx.step_output_path(step_id, path) {
            return value_to_string(value);
        }
        return literal.to_string();
    }

    match ctx.get(name) {
        Some(value) => value.to_string(),
        None => literal.to_string(),
    }
}

/// Computes the value of a built-in token, if `name` is one.
fn builtin(name: &str) -> Option<String> {
    let now = Local::now();

    let value = match name {
        "RANDOM_ID" | "UUID" => Uuid::new_v4().to_string(),
        "TIMESTAMP" => now.timestamp().to_string(),
        "ISO_TIMESTAMP" => now.to_rfc3339_opts(SecondsFormat::Secs, true),
        "DATE" => now.format("%Y-%m-%d").to_string(),
        "TIME" => now.format("%H:%M:%S").to_string(),
        "DATETIME" => now.format("%Y-%m-%d %H:%M:%S").to_string(),
        "YEAR" => now.year().to_string(),
        "MONTH" => format!("{:02}", now.month()),
        "DAY" => format!("{:02}", now.day()),
        "HOUR" => format!("{:02}", now.hour()),
        "MINUTE" => format!("{:02}", now.minute()),
        "SECOND" => format!("{:02}", now.second()),
        _ => return None,
    };

    Some(value)
}

/// Renders a JSON value into a string context.
///
/// Strings are used verbatim; everything else becomes canonical JSON
/// (serde_json keeps object keys sorted).
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::OutputData;
    use serde_json::json;
    use std::collections::HashMap;

    fn ctx_with_step(step_id: &str, output: Value) -> VariableContext {
        let mut ctx = VariableContext::default();
        match output {
            Value::Object(map) => ctx.set_step_output(step_id, map),
            other => panic!("expected object, got {:?}", other),
        }
        ctx
    }

    #[test]
    fn test_no_placeholders_passthrough() {
        let ctx = VariableContext::default();
        assert_eq!(interpolate("plain text", &ctx), "plain text");
    }

    #[test]
    fn test_variable_resolution_both_syntaxes() {
        let mut vars = HashMap::new();
        vars.insert("BASE_URL".to_string(), "https://example.com".to_string());
        let ctx = VariableContext::new(&vars, &HashMap::new());

        assert_eq!(
            interpolate("${BASE_URL}/users", &ctx),
            "https://example.com/users"
        );
        assert_eq!(
            interpolate("{{BASE_URL}}/users", &ctx),
            "https://example.com/users"
        );
    }

    #[test]
    fn test_unresolved_passes_through() {
        let ctx = VariableContext::default();
        assert_eq!(interpolate("x=${MISSING}", &ctx), "x=${MISSING}");
        assert_eq!(interpolate("x={{MISSING}}", &ctx), "x={{MISSING}}");
        assert_eq!(
            interpolate("${step1.no.such.path}", &ctx),
            "${step1.no.such.path}"
        );
    }

    #[test]
    fn test_step_output_nested_reference() {
        let ctx = ctx_with_step("step1", json!({"user": {"id": "abc"}}));
        assert_eq!(interpolate("id=${step1.user.id}", &ctx), "id=abc");
        assert_eq!(interpolate("id={{ step1.user.id }}", &ctx), "id=abc");
    }

    #[test]
    fn test_object_value_serialized_as_json() {
        let ctx = ctx_with_step("step1", json!({"user": {"name": "ada", "id": 1}}));
        // Canonical JSON: keys sorted
        assert_eq!(
            interpolate("${step1.user}", &ctx),
            r#"{"id":1,"name":"ada"}"#
        );
    }

    #[test]
    fn test_random_id_unique_per_interpolation() {
        let ctx = VariableContext::default();
        let first = interpolate("${RANDOM_ID}", &ctx);
        let second = interpolate("${RANDOM_ID}", &ctx);

        assert_eq!(first.len(), 36);
        assert_ne!(first, second);
    }

    #[test]
    fn test_uuid_alias() {
        let ctx = VariableContext::default();
        let value = interpolate("${UUID}", &ctx);
        assert!(Uuid::parse_str(&value).is_ok());
    }

    #[test]
    fn test_timestamp_builtin() {
        let ctx = VariableContext::default();
        let value = interpolate("${TIMESTAMP}", &ctx);
        let parsed: i64 = value.parse().unwrap();
        assert!(parsed > 1_600_000_000);
    }

    #[test]
    fn test_date_components_zero_padded() {
        let ctx = VariableContext::default();
        assert_eq!(interpolate("${MONTH}", &ctx).len(), 2);
        assert_eq!(interpolate("${DAY}", &ctx).len(), 2);
        assert_eq!(interpolate("${HOUR}", &ctx).len(), 2);
    }

    #[test]
    fn test_builtin_precedence_over_variables() {
        // A context variable named like a built-in must not shadow it
        let mut vars = HashMap::new();
        vars.insert("TIMESTAMP".to_string(), "shadowed".to_string());
        let ctx = VariableContext::new(&vars, &HashMap::new());

        let value = interpolate("${TIMESTAMP}", &ctx);
        assert_ne!(value, "shadowed");
        assert!(value.parse::<i64>().is_ok());
    }

    #[test]
    fn test_interpolate_value_recursive() {
        let mut vars = HashMap::new();
        vars.insert("NAME".to_string(), "ada".to_string());
        let ctx = VariableContext::new(&vars, &HashMap::new());

        let config = json!({
            "user": "${NAME}",
            "nested": {"greeting": "hello ${NAME}"},
            "list": ["${NAME}", 42, true]
        });

        let resolved = interpolate_value(&config, &ctx);
        assert_eq!(resolved["user"], "ada");
        assert_eq!(resolved["nested"]["greeting"], "hello ada");
        assert_eq!(resolved["list"][0], "ada");
        assert_eq!(resolved["list"][1], 42);
    }

    #[test]
    fn test_multiple_placeholders_one_string() {
        let mut vars = HashMap::new();
        vars.insert("A".to_string(), "1".to_string());
        vars.insert("B".to_string(), "2".to_string());
        let ctx = VariableContext::new(&vars, &HashMap::new());

        assert_eq!(interpolate("${A}-${B}-${C}", &ctx), "1-2-${C}");
    }
}
