//! Parameter-space expansion: a default point plus a set of named sweep
//! dimensions, expanded into an enumerated sequence of concrete points.
//!
//! Grounded on the `ParamSpace.iterator(with_info='state_no_str')` contract:
//! each point in the sweep comes back paired with a zero-padded id string
//! wide enough to hold the largest id in the space.

use serde::Serialize;
use serde_json::Value;

/// One sweep dimension: a dotted key path into the default point's mapping,
/// and the ordered list of values to sweep over at that path.
#[derive(Debug, Clone, Serialize)]
pub struct ParamDim {
    pub key_path: Vec<String>,
    pub values: Vec<Value>,
}

/// A parameter space: a default point overridden, dimension by dimension,
/// to produce every point in the sweep.
#[derive(Debug, Clone, Serialize)]
pub struct ParamSpace {
    pub default: Value,
    pub dims: Vec<ParamDim>,
}

/// The marker key a config value uses to declare a sweep dimension at a
/// given position in the tree, e.g. `{"$sweep": {"default": 0, "values":
/// [1, 2, 3]}}`. A plain object key, so no custom YAML tag parser is
/// needed to recognize a sweep.
const SWEEP_MARKER_KEY: &str = "$sweep";

impl ParamSpace {
    pub fn new(default: Value, dims: Vec<ParamDim>) -> Self {
        Self { default, dims }
    }

    /// Parses a merged `parameter_space` config value into a `ParamSpace`:
    /// walks the tree looking for `$sweep` markers, replacing each with its
    /// `default` value to build the default point, and recording its
    /// `values` list as a sweep dimension at that key path. A config with no
    /// markers becomes a zero-volume parameter space whose only point is the
    /// value itself (single-point mode).
    pub fn from_value(raw: &Value) -> Self {
        let mut dims = Vec::new();
        let default = collect_dims(raw, &mut dims, &mut Vec::new());
        Self { default, dims }
    }

    /// Total number of points in the sweep: the product of dimension
    /// lengths, or 0 if no dimension is marked as swept (a parameter space
    /// with dimensions but an empty sweep has no task to run).
    pub fn volume(&self) -> usize {
        if self.dims.is_empty() {
            return 0;
        }
        self.dims.iter().map(|d| d.values.len()).product()
    }

    /// Width (in digits) of the zero-padded id string needed to represent
    /// every id from `0` to `volume - 1`, minimum 1.
    fn id_width(volume: usize) -> usize {
        if volume <= 1 {
            return 1;
        }
        let max_id = volume - 1;
        ((max_id as f64).log10().floor() as usize) + 1
    }

    /// Iterate over every point in the sweep, each paired with its
    /// zero-padded id string. Empty if `volume()` is 0.
    pub fn iterator(&self) -> impl Iterator<Item = (Value, String)> + '_ {
        let volume = self.volume();
        let width = Self::id_width(volume);
        (0..volume).map(move |i| {
            let point = self.point_at(i);
            (point, format!("{:0width$}", i, width = width))
        })
    }

    /// Resolve the concrete point at sweep index `i` by applying each
    /// dimension's value at the corresponding mixed-radix digit.
    fn point_at(&self, i: usize) -> Value {
        let mut point = self.default.clone();
        let mut remainder = i;
        // Right-to-left mixed-radix decomposition, dims ordered as declared.
        let mut digits = vec![0usize; self.dims.len()];
        for (idx, dim) in self.dims.iter().enumerate().rev() {
            let radix = dim.values.len().max(1);
            digits[idx] = remainder % radix;
            remainder /= radix;
        }
        for (dim, digit) in self.dims.iter().zip(digits.iter()) {
            set_at_path(&mut point, &dim.key_path, dim.values[*digit].clone());
        }
        point
    }
}

/// Walks `value` depth-first, replacing every `$sweep` marker object with
/// its `default` and recording `(path, values)` into `dims`. Returns the
/// rebuilt tree with every marker resolved to a concrete default value.
fn collect_dims(value: &Value, dims: &mut Vec<ParamDim>, path: &mut Vec<String>) -> Value {
    let Some(obj) = value.as_object() else {
        return value.clone();
    };
    if let Some(sweep) = obj.get(SWEEP_MARKER_KEY) {
        let default = sweep.get("default").cloned().unwrap_or(Value::Null);
        let values = sweep
            .get("values")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        dims.push(ParamDim {
            key_path: path.clone(),
            values,
        });
        return default;
    }
    let mut out = serde_json::Map::with_capacity(obj.len());
    for (key, child) in obj {
        path.push(key.clone());
        let resolved = collect_dims(child, dims, path);
        path.pop();
        out.insert(key.clone(), resolved);
    }
    Value::Object(out)
}

fn set_at_path(root: &mut Value, path: &[String], leaf: Value) {
    match path.split_first() {
        None => *root = leaf,
        Some((head, rest)) => {
            if !root.is_object() {
                *root = Value::Object(serde_json::Map::new());
            }
            let obj = root.as_object_mut().expect("just ensured root is an object");
            let entry = obj
                .entry(head.clone())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if rest.is_empty() {
                *entry = leaf;
            } else {
                set_at_path(entry, rest, leaf);
            }
        }
    }
}
