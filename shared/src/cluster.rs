//! Decoding the cluster-environment mapping into `ClusterParams`: parses a
//! condensed node-list notation or a single node name, resolves this
//! node's index within that list, and validates `num_nodes` against the
//! list length.

use std::collections::HashMap;

use crate::error::ClusterError;

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterParams {
    pub job_id: String,
    pub num_nodes: usize,
    pub node_list: Vec<String>,
    pub node_name: String,
    pub node_index: usize,
    pub timestamp: String,
    pub custom_out_dir: Option<String>,
    pub additional_run_dir_fstrs: Vec<String>,
}

const REQUIRED_VARS: &[&str] = &["job_id", "num_nodes", "node_list", "node_name", "timestamp"];

/// Resolve the cluster parameters from an opaque environment mapping,
/// failing on any missing required key, a `num_nodes`/`node_list` length
/// mismatch, or a `node_name` absent from `node_list`.
pub fn resolve_cluster_params(env: &HashMap<String, String>) -> Result<ClusterParams, ClusterError> {
    let missing: Vec<String> = REQUIRED_VARS
        .iter()
        .filter(|k| !env.contains_key(**k))
        .map(|k| k.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ClusterError::MissingVars(missing));
    }

    let job_id = env["job_id"].clone();
    let node_name = env["node_name"].clone();
    let timestamp = env["timestamp"].clone();

    let num_nodes: usize = env["num_nodes"]
        .parse()
        .map_err(|_| ClusterError::InvalidNumNodes(env["num_nodes"].clone()))?;

    let mut node_list = parse_node_list(&env["node_list"]);
    if num_nodes != node_list.len() {
        return Err(ClusterError::NodeListLengthMismatch {
            len: node_list.len(),
            num_nodes,
        });
    }
    if !node_list.iter().any(|n| n == &node_name) {
        return Err(ClusterError::NodeNameNotInList(node_name));
    }
    node_list.sort();

    let node_index = node_list
        .iter()
        .position(|n| n == &node_name)
        .expect("presence already checked above");

    let custom_out_dir = env.get("custom_out_dir").cloned();
    let additional_run_dir_fstrs = env
        .get("additional_run_dir_fstrs")
        .map(|s| s.split(',').map(|p| p.trim().to_string()).collect())
        .unwrap_or_default();

    Ok(ClusterParams {
        job_id,
        num_nodes,
        node_list,
        node_name,
        node_index,
        timestamp,
        custom_out_dir,
        additional_run_dir_fstrs,
    })
}

/// Decide whether this node is responsible for sweep index `i`, per the
/// modulo/offset partitioning scheme.
pub fn node_is_responsible_for(i: usize, params: &ClusterParams) -> bool {
    (i as isize - params.node_index as isize).rem_euclid(params.num_nodes as isize) == 0
}

/// Parse either a condensed bracket notation (`node[002,004-011,016]`) or a
/// single plain node name into the list of individual node names.
fn parse_node_list(raw: &str) -> Vec<String> {
    let Some(open) = raw.find('[') else {
        return vec![raw.to_string()];
    };
    let Some(close) = raw.rfind(']') else {
        return vec![raw.to_string()];
    };
    let prefix = &raw[..open];
    let body = &raw[open + 1..close];

    let mut names = Vec::new();
    for part in body.split(',') {
        let part = part.trim();
        if let Some((lo, hi)) = part.split_once('-') {
            let width = lo.len();
            let lo: u64 = lo.parse().unwrap_or(0);
            let hi: u64 = hi.parse().unwrap_or(lo);
            for n in lo..=hi {
                names.push(format!("{prefix}{n:0width$}"));
            }
        } else {
            names.push(format!("{prefix}{part}"));
        }
    }
    names
}
