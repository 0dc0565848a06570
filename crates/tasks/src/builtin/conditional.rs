use std::cmp::Ordering;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{display, parse_typed_config};
use crate::{template, Context, ExecutableTask, TaskError};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Comparison {
    #[default]
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    Exists,
}

#[derive(Debug, Default, Deserialize)]
struct Condition {
    #[serde(rename = "type", default)]
    comparison: Comparison,
    #[serde(default)]
    left: Value,
    #[serde(default)]
    right: Value,
}

#[derive(Debug, Deserialize)]
struct ConditionalConfig {
    #[serde(default)]
    condition: Condition,
    #[serde(default)]
    true_value: Value,
    #[serde(default)]
    false_value: Value,
}

/// Pick `true_value` or `false_value` by evaluating a comparison.
///
/// Operands written as a single `${key}` reference are compared with the
/// referenced context value's own JSON type.
pub struct ConditionalTask {
    name: String,
    config: Value,
}

impl ConditionalTask {
    pub fn new(name: impl Into<String>, config: Value) -> Self {
        Self { name: name.into(), config }
    }
}

fn order(left: &Value, right: &Value) -> Result<Ordering, TaskError> {
    let ordering = match (left, right) {
        (Value::Number(l), Value::Number(r)) => l
            .as_f64()
            .zip(r.as_f64())
            .and_then(|(l, r)| l.partial_cmp(&r)),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        _ => None,
    };
    ordering.ok_or_else(|| TaskError::execution(format!("cannot compare {left} with {right}")))
}

fn evaluate(condition: &Condition) -> Result<bool, TaskError> {
    let Condition { comparison, left, right } = condition;
    Ok(match comparison {
        Comparison::Equals => left == right,
        Comparison::NotEquals => left != right,
        Comparison::GreaterThan => order(left, right)? == Ordering::Greater,
        Comparison::LessThan => order(left, right)? == Ordering::Less,
        Comparison::Contains => display(left).contains(&display(right)),
        Comparison::Exists => !left.is_null(),
    })
}

#[async_trait]
impl ExecutableTask for ConditionalTask {
    async fn execute(&self, ctx: &Context) -> Result<Value, TaskError> {
        // Operands resolve to their raw context value, `Null` when absent.
        let mut raw = self.config.clone();
        if let Some(condition) = raw.get_mut("condition").and_then(Value::as_object_mut) {
            for side in ["left", "right"] {
                if let Some(operand) = condition.get_mut(side) {
                    *operand = template::resolve_value(operand, ctx);
                }
            }
        }

        let config: ConditionalConfig =
            parse_typed_config(&raw, ctx, &["true_value", "false_value"])?;
        let matched = evaluate(&config.condition)?;
        debug!(task = %self.name, matched, "condition evaluated");
        Ok(if matched {
            config.true_value
        } else {
            config.false_value
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn run(config: Value, ctx: Value) -> Result<Value, TaskError> {
        let ctx = ctx.as_object().cloned().unwrap_or_default();
        ConditionalTask::new("check", config).execute(&ctx).await
    }

    #[tokio::test]
    async fn contains_against_nested_context_value() {
        let out = run(
            json!({
                "condition": {
                    "type": "contains",
                    "left": "${version_result.stdout}",
                    "right": "Python 3",
                },
                "true_value": "Python 3 detected",
                "false_value": "Python 3 not found",
            }),
            json!({ "version_result": { "stdout": "Python 3.12.1\n" } }),
        )
        .await
        .unwrap();
        assert_eq!(out, json!("Python 3 detected"));
    }

    #[tokio::test]
    async fn numeric_comparisons_keep_json_types() {
        let config = json!({
            "condition": { "type": "greater_than", "left": "${count}", "right": 10 },
            "true_value": "many",
            "false_value": "few",
        });
        assert_eq!(run(config.clone(), json!({ "count": 15 })).await.unwrap(), json!("many"));
        assert_eq!(run(config, json!({ "count": 2 })).await.unwrap(), json!("few"));
    }

    #[tokio::test]
    async fn exists_and_default_equals() {
        let exists = json!({
            "condition": { "type": "exists", "left": "${maybe}" },
            "true_value": true,
            "false_value": false,
        });
        assert_eq!(run(exists.clone(), json!({})).await.unwrap(), json!(false));
        assert_eq!(run(exists, json!({ "maybe": 0 })).await.unwrap(), json!(true));

        let equals = json!({ "condition": { "left": "a", "right": "a" }, "true_value": 1 });
        assert_eq!(run(equals, json!({})).await.unwrap(), json!(1));
    }

    #[tokio::test]
    async fn branch_values_keep_referenced_types() {
        let config = json!({
            "condition": { "type": "exists", "left": "${payload}" },
            "true_value": "${payload}",
            "false_value": "missing: ${name}",
        });
        let ctx = json!({ "payload": { "id": 7 }, "name": "x" });
        assert_eq!(run(config.clone(), ctx).await.unwrap(), json!({ "id": 7 }));
        assert_eq!(run(config, json!({ "name": "x" })).await.unwrap(), json!("missing: x"));
    }

    #[tokio::test]
    async fn mismatched_ordering_is_an_execution_error() {
        let config = json!({ "condition": { "type": "less_than", "left": "a", "right": 1 } });
        assert!(matches!(run(config, json!({})).await, Err(TaskError::Execution(_))));
    }
}
