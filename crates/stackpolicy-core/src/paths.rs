use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// File constants
// ---------------------------------------------------------------------------

pub const CONFIG_FILE: &str = "stackpolicy.yaml";
pub const STORE_FILE: &str = ".stackpolicy/policies.db";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn default_store_path() -> PathBuf {
    PathBuf::from(STORE_FILE)
}

/// Relative store paths are resolved against the config file's directory.
pub fn resolve_store_path(config_path: &Path, store_path: &Path) -> PathBuf {
    if store_path.is_absolute() {
        return store_path.to_path_buf();
    }
    match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(store_path),
        _ => store_path.to_path_buf(),
    }
}
