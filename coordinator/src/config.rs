//! Layered configuration pipeline: recursively merges up to five config
//! layers into the meta configuration the coordinator runs with: base ->
//! user -> model-default (attached at `parameter_space.<model_name>`) ->
//! run -> programmatic overrides, each layer right-biased over the
//! previous. `parameter_space` is disallowed in the user layer so that a
//! user file cannot silently clobber the sweep declared by the run/model
//! layers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use shared::error::ConfigError;
use shared::merge::recursive_update;
use shared::paramspace::ParamSpace;
use shared::registry::ModelInfo;

use crate::validation::{parse_constraint, Constraint};

const BASE_CFG_YAML: &str = include_str!("../templates/base_cfg.yml");

/// One layer's provenance, kept for the pre-run backup: either a path to
/// the file it was read from, or the literal value (for layers that never
/// had a backing file, like the bundled base config or programmatic
/// overrides).
#[derive(Debug, Clone)]
pub enum CfgPart {
    Path(PathBuf),
    Inline(Value),
}

pub type CfgParts = BTreeMap<String, CfgPart>;

/// The result of running the configuration pipeline: the merged config, its
/// parameter space, the constraints to validate it against, and the parts
/// needed to back it up.
pub struct MetaConfig {
    pub merged: Value,
    pub param_space: ParamSpace,
    pub parameters_to_validate: BTreeMap<Vec<String>, Constraint>,
    pub cfg_parts: CfgParts,
}

/// Runs the 5-layer merge (base -> user -> model -> run -> programmatic
/// overrides) and normalizes the resulting `parameter_space` field into a
/// `ParamSpace`.
pub fn build_meta_cfg(
    model_name: &str,
    model_info: &ModelInfo,
    user_cfg_path: Option<&Path>,
    run_cfg_path: Option<&Path>,
    programmatic_overrides: Option<&Value>,
) -> Result<MetaConfig, ConfigError> {
    let base_cfg: Value =
        serde_yaml::from_str(BASE_CFG_YAML).expect("bundled base config is valid YAML");

    let mut cfg_parts: CfgParts = BTreeMap::new();
    cfg_parts.insert("base".to_string(), CfgPart::Inline(base_cfg.clone()));

    let mut merged = base_cfg;

    if let Some(path) = user_cfg_path {
        let user_cfg = read_yaml(path)?;
        if user_cfg.get("parameter_space").is_some() {
            return Err(ConfigError::UserLayerSetsParameterSpace {
                path: path.to_path_buf(),
            });
        }
        recursive_update(&mut merged, &user_cfg);
        cfg_parts.insert("user".to_string(), CfgPart::Path(path.to_path_buf()));
    }

    let (model_cfg, parameters_to_validate) = load_model_cfg(model_info)?;
    cfg_parts.insert(
        "model".to_string(),
        CfgPart::Path(model_info.default_config.clone()),
    );

    {
        let root = merged
            .as_object_mut()
            .expect("base config root is a mapping");
        let pspace_entry = root
            .entry("parameter_space")
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        let pspace_obj = pspace_entry
            .as_object_mut()
            .expect("parameter_space is a mapping");
        let model_slot = pspace_obj
            .entry(model_name.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        recursive_update(model_slot, &model_cfg);
    }

    if let Some(path) = run_cfg_path {
        let run_cfg = read_yaml(path)?;
        recursive_update(&mut merged, &run_cfg);
        cfg_parts.insert("run".to_string(), CfgPart::Path(path.to_path_buf()));
    }

    if let Some(overrides) = programmatic_overrides {
        recursive_update(&mut merged, overrides);
        cfg_parts.insert("update".to_string(), CfgPart::Inline(overrides.clone()));
    }

    let pspace_value = merged
        .as_object()
        .and_then(|m| m.get("parameter_space"))
        .cloned()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    let param_space = ParamSpace::from_value(&pspace_value);

    Ok(MetaConfig {
        merged,
        param_space,
        parameters_to_validate,
        cfg_parts,
    })
}

fn read_yaml(path: &Path) -> Result<Value, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads a model's default configuration file, splitting off its
/// `parameters_to_validate` block (if present) before returning the rest as
/// the model's config payload to merge into `parameter_space.<model_name>`.
/// An entry that doesn't parse as a recognized constraint is logged and
/// skipped rather than failing the whole run.
fn load_model_cfg(
    model_info: &ModelInfo,
) -> Result<(Value, BTreeMap<Vec<String>, Constraint>), ConfigError> {
    let mut model_cfg = read_yaml(&model_info.default_config)?;
    let mut parameters_to_validate = BTreeMap::new();

    if let Some(obj) = model_cfg.as_object_mut() {
        if let Some(Value::Object(spec)) = obj.remove("parameters_to_validate") {
            for (dotted_path, constraint_value) in spec {
                let key_path: Vec<String> = dotted_path.split('.').map(str::to_string).collect();
                match parse_constraint(&constraint_value) {
                    Some(constraint) => {
                        parameters_to_validate.insert(key_path, constraint);
                    }
                    None => {
                        tracing::warn!(
                            path = %model_info.default_config.display(),
                            key = %dotted_path,
                            "unrecognized validation constraint, skipping"
                        );
                    }
                }
            }
        }
    }

    Ok((model_cfg, parameters_to_validate))
}
