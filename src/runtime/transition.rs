use evalexpr::{ContextWithMutableVariables, DefaultNumericTypes, HashMapContext, build_operator_tree};
use serde_json::Value;
use tracing::warn;

use crate::dsl::NextState;

/// Picks the state that follows a step which produced `result`.
///
/// `None` means the run is over.
pub fn resolve_next(next: Option<&NextState>, result: &Value) -> Option<String> {
    match next? {
        NextState::Static(state) => Some(state.clone()),
        NextState::OnResult(branch) => {
            if result.is_null() {
                branch.on_null.clone()
            } else {
                branch.otherwise.clone()
            }
        }
        NextState::When(branch) => {
            if evaluate(&branch.when, result) {
                branch.then.clone()
            } else {
                branch.otherwise.clone()
            }
        }
    }
}

/// Evaluates a `when` expression; failures count as false.
pub fn evaluate(expression: &str, result: &Value) -> bool {
    let tree = match build_operator_tree::<DefaultNumericTypes>(expression) {
        Ok(tree) => tree,
        Err(e) => {
            warn!(expression, error = %e, "Invalid transition condition");
            return false;
        }
    };
    let eval_ctx = condition_context(result);
    tree.eval_boolean_with_context(&eval_ctx).unwrap_or_else(|e| {
        warn!(expression, error = %e, "Condition evaluation failed");
        false
    })
}

/// Variables visible to a condition: `is_null`, `len`, `result` for scalar
/// results, and each scalar field of an object result.
fn condition_context(result: &Value) -> HashMapContext<DefaultNumericTypes> {
    let mut eval_ctx = HashMapContext::<DefaultNumericTypes>::new();
    let len = match result {
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        Value::String(s) => s.chars().count(),
        _ => 0,
    };
    let _ = eval_ctx.set_value("is_null".to_string(), evalexpr::Value::Boolean(result.is_null()));
    let _ = eval_ctx.set_value("len".to_string(), evalexpr::Value::Int(len as i64));

    match result {
        Value::Object(map) => {
            for (k, v) in map {
                if let Some(ev) = to_eval_value(v) {
                    let _ = eval_ctx.set_value(k.clone(), ev);
                }
            }
        }
        other => {
            if let Some(ev) = to_eval_value(other) {
                let _ = eval_ctx.set_value("result".to_string(), ev);
            }
        }
    }
    eval_ctx
}

fn to_eval_value(value: &Value) -> Option<evalexpr::Value<DefaultNumericTypes>> {
    match value {
        Value::String(s) => Some(evalexpr::Value::String(s.clone())),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() { Some(evalexpr::Value::Int(i)) }
            else if let Some(f) = n.as_f64() { Some(evalexpr::Value::Float(f)) }
            else { None }
        }
        Value::Bool(b) => Some(evalexpr::Value::Boolean(*b)),
        _ => None,
    }
}
