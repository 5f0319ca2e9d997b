pub mod id;
pub mod send;
pub mod start;
pub mod status;
pub mod stop;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use marklive_core::{config, identity};

pub(crate) fn home() -> Result<PathBuf> {
    config::home().context("could not determine home directory")
}

/// Turn a target naming an existing file into its id, so the daemon never
/// resolves a relative path against its own working directory. Keys and
/// ids pass through untouched.
pub(crate) fn resolve_target(raw: &str) -> String {
    let path = Path::new(raw);
    if !path.is_file() {
        return raw.to_string();
    }
    match identity::resolve_file(path) {
        Ok((_, id)) => id.to_string(),
        Err(_) => raw.to_string(),
    }
}
