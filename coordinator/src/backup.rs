//! Pre-run backup of the configuration used for a run, so it can be
//! reconstructed later without depending on the layered config files still
//! being present at their original paths.
//!
//! Writes the merged meta config and parameter space into the run's
//! `config/` directory, then (if enabled) backs up each involved config
//! layer and the model executable.

use std::path::Path;

use serde_json::Value;

use crate::config::{CfgPart, CfgParts};
use crate::error::CoordinatorError;
use shared::paramspace::ParamSpace;

/// Writes the backup artifacts described above into `config_dir` (and, for
/// the executable, into `run_dir/backup`).
#[allow(clippy::too_many_arguments)]
pub fn perform_backup(
    config_dir: &Path,
    run_dir: &Path,
    merged: &Value,
    param_space: &ParamSpace,
    cfg_parts: &CfgParts,
    backup_cfg_files: bool,
    backup_executable: Option<&Path>,
    model_name: &str,
) -> Result<(), CoordinatorError> {
    tracing::info!("performing configuration backup");

    write_yaml(&config_dir.join("meta_cfg.yml"), merged)?;
    tracing::debug!("backed up meta configuration");

    write_yaml(
        &config_dir.join("parameter_space.yml"),
        &serde_json::to_value(param_space).expect("ParamSpace always serializes"),
    )?;
    tracing::debug!("backed up parameter space");

    if backup_cfg_files {
        for (part_name, part) in cfg_parts {
            let dest = config_dir.join(format!("{part_name}_cfg.yml"));
            match part {
                CfgPart::Path(src) => {
                    std::fs::copy(src, &dest).map_err(|source| CoordinatorError::RunDirIo {
                        path: dest.clone(),
                        source,
                    })?;
                }
                CfgPart::Inline(value) => write_yaml(&dest, value)?,
            }
        }
        tracing::debug!(count = cfg_parts.len(), "backed up configuration parts");
    }

    if let Some(binpath) = backup_executable {
        let backup_dir = run_dir.join("backup");
        std::fs::create_dir_all(&backup_dir).map_err(|source| CoordinatorError::RunDirIo {
            path: backup_dir.clone(),
            source,
        })?;
        let dest = backup_dir.join(model_name);
        std::fs::copy(binpath, &dest).map_err(|source| CoordinatorError::RunDirIo {
            path: dest,
            source,
        })?;
        tracing::debug!("backed up executable");
    }

    Ok(())
}

fn write_yaml(path: &Path, value: &Value) -> Result<(), CoordinatorError> {
    let content = serde_yaml::to_string(value).expect("serde_json::Value always serializes to YAML");
    std::fs::write(path, content).map_err(|source| CoordinatorError::RunDirIo {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::paramspace::ParamDim;
    use std::collections::BTreeMap;

    #[test]
    fn backs_up_meta_cfg_and_parameter_space() {
        let run_dir = tempfile::tempdir().unwrap();
        let config_dir = run_dir.path().join("config");
        std::fs::create_dir_all(&config_dir).unwrap();

        let merged = json!({"out_dir": "/tmp", "parameter_space": {}});
        let space = ParamSpace::new(json!({"seed": 0}), vec![]);
        let cfg_parts: CfgParts = BTreeMap::new();

        perform_backup(
            &config_dir,
            run_dir.path(),
            &merged,
            &space,
            &cfg_parts,
            true,
            None,
            "demo",
        )
        .unwrap();

        assert!(config_dir.join("meta_cfg.yml").is_file());
        assert!(config_dir.join("parameter_space.yml").is_file());
    }

    #[test]
    fn backs_up_cfg_parts_and_executable_when_enabled() {
        let run_dir = tempfile::tempdir().unwrap();
        let config_dir = run_dir.path().join("config");
        std::fs::create_dir_all(&config_dir).unwrap();

        let model_src = run_dir.path().join("model_bin");
        std::fs::write(&model_src, b"binary contents").unwrap();

        let mut cfg_parts: CfgParts = BTreeMap::new();
        cfg_parts.insert("base".to_string(), CfgPart::Inline(json!({"a": 1})));

        let merged = json!({});
        let space = ParamSpace::new(
            json!({}),
            vec![ParamDim {
                key_path: vec!["x".to_string()],
                values: vec![json!(1)],
            }],
        );

        perform_backup(
            &config_dir,
            run_dir.path(),
            &merged,
            &space,
            &cfg_parts,
            true,
            Some(&model_src),
            "demo",
        )
        .unwrap();

        assert!(config_dir.join("base_cfg.yml").is_file());
        assert!(run_dir.path().join("backup").join("demo").is_file());
    }

    #[test]
    fn skips_cfg_parts_when_disabled() {
        let run_dir = tempfile::tempdir().unwrap();
        let config_dir = run_dir.path().join("config");
        std::fs::create_dir_all(&config_dir).unwrap();

        let mut cfg_parts: CfgParts = BTreeMap::new();
        cfg_parts.insert("base".to_string(), CfgPart::Inline(json!({"a": 1})));

        let merged = json!({});
        let space = ParamSpace::new(json!({}), vec![]);

        perform_backup(
            &config_dir,
            run_dir.path(),
            &merged,
            &space,
            &cfg_parts,
            false,
            None,
            "demo",
        )
        .unwrap();

        assert!(!config_dir.join("base_cfg.yml").is_file());
    }
}
