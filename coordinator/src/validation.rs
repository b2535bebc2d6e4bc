//! Parameter-validation constraints and the aggregated validation report.
//!
//! Every point in the parameter space, including the default point, is
//! checked against each declared constraint; failures are deduplicated per
//! key path and reported as a single formatted message with aligned key
//! paths.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use shared::error::ValidationError;
use shared::paramspace::ParamSpace;

/// A constraint on one key path in a parameter space. Parsed from a model's
/// `parameters_to_validate` block (see `crate::config::load_model_cfg`).
#[derive(Debug, Clone)]
pub enum Constraint {
    Range { min: f64, max: f64 },
    OneOf(Vec<Value>),
}

impl Constraint {
    fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            Constraint::Range { min, max } => {
                let v = value
                    .as_f64()
                    .ok_or_else(|| format!("expected a number, got {value}"))?;
                if v < *min || v > *max {
                    return Err(format!(
                        "value {v} is outside the allowed range [{min}, {max}]"
                    ));
                }
                Ok(())
            }
            Constraint::OneOf(values) => {
                if values.contains(value) {
                    Ok(())
                } else {
                    Err(format!("value {value} is not one of {values:?}"))
                }
            }
        }
    }
}

/// Parses one entry of a model's `parameters_to_validate` block:
/// `{"range": {"min": ..., "max": ...}}` or `{"one_of": [...]}`.
pub fn parse_constraint(value: &Value) -> Option<Constraint> {
    let obj = value.as_object()?;
    if let Some(range) = obj.get("range") {
        let min = range.get("min")?.as_f64()?;
        let max = range.get("max")?.as_f64()?;
        return Some(Constraint::Range { min, max });
    }
    if let Some(values) = obj.get("one_of").and_then(Value::as_array) {
        return Some(Constraint::OneOf(values.clone()));
    }
    None
}

fn get_at_path<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = value;
    for key in path {
        current = current.as_object()?.get(key)?;
    }
    Some(current)
}

/// Validates every point in `space` (including the default point) against
/// `to_validate`, aggregating and deduplicating failures per key path into
/// a single formatted error. A no-op if `to_validate` is empty.
pub fn validate_param_space(
    space: &ParamSpace,
    to_validate: &BTreeMap<Vec<String>, Constraint>,
) -> Result<(), ValidationError> {
    if to_validate.is_empty() {
        return Ok(());
    }

    let mut invalid: BTreeMap<String, HashSet<String>> = BTreeMap::new();
    let points = space
        .iterator()
        .map(|(p, _)| p)
        .chain(std::iter::once(space.default.clone()));

    for point in points {
        for (key_path, constraint) in to_validate {
            let path_str = key_path.join(".");
            let Some(value) = get_at_path(&point, key_path) else {
                invalid
                    .entry(path_str)
                    .or_default()
                    .insert("parameter is missing from this point".to_string());
                continue;
            };
            if let Err(msg) = constraint.check(value) {
                invalid.entry(path_str).or_default().insert(msg);
            }
        }
    }

    if invalid.is_empty() {
        return Ok(());
    }

    let width = invalid.keys().map(|k| k.len()).max().unwrap_or(0);
    let mut message = format!(
        "Validation failed for {} parameter{}:\n\n",
        invalid.len(),
        if invalid.len() > 1 { "s" } else { "" }
    );
    for (path, errs) in &invalid {
        if errs.len() == 1 {
            message.push_str(&format!(
                "  - {path:<width$}  :  {}\n",
                errs.iter().next().unwrap()
            ));
        } else {
            message.push_str(&format!(
                "  - {path:<width$}  :  validation failed for {} sweep values:\n",
                errs.len()
            ));
            for e in errs {
                message.push_str(&format!("     - {e}\n"));
            }
        }
    }
    message.push_str("\nInspect the details above and adjust the run configuration accordingly.\n");

    Err(ValidationError { message })
}
