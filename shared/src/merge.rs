//! Recursive config merge over `serde_json::Value`.
//!
//! A direct structural port of the config-pipeline's merge rule: recurse
//! into keys present in both sides as long as both sides are objects,
//! otherwise the update value wins outright. Arrays are never merged
//! element-wise; an array on either side is treated as a leaf.

use serde_json::Value;

/// Update `base` in place with the contents of `update`, recursing into
/// nested objects and replacing everything else.
pub fn recursive_update(base: &mut Value, update: &Value) {
    let Some(update_obj) = update.as_object() else {
        *base = update.clone();
        return;
    };

    if !base.is_object() {
        *base = Value::Object(serde_json::Map::new());
    }

    let base_obj = base.as_object_mut().expect("just ensured base is an object");
    for (key, val) in update_obj {
        match val {
            Value::Object(_) => {
                let entry = base_obj
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(serde_json::Map::new()));
                recursive_update(entry, val);
            }
            _ => {
                base_obj.insert(key.clone(), val.clone());
            }
        }
    }
}
