use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::Result;
use crate::policy::Policy;

/// Load a policy from a JSON document on disk.
pub fn load_policy<P: AsRef<Path>>(path: P) -> Result<Policy> {
    let path = path.as_ref();
    debug!("Loading policy from {:?}", path);

    let content = fs::read_to_string(path)?;
    let policy: Policy = serde_json::from_str(&content)?;

    info!(
        "Loaded policy {} ({} rules) from {}",
        policy.name,
        policy.rules.len(),
        path.display()
    );
    Ok(policy)
}

/// Load several policy documents in order, stopping at the first failure.
pub fn load_policies<I, P>(paths: I) -> Result<Vec<Policy>>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    paths.into_iter().map(load_policy).collect()
}

/// Load every `*.json` file in `dir`, sorted by file name.
pub fn load_policy_dir<P: AsRef<Path>>(dir: P) -> Result<Vec<Policy>> {
    let dir = dir.as_ref();
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    debug!("Found {} policy files in {}", paths.len(), dir.display());
    load_policies(paths)
}
