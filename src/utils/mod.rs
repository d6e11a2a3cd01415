//! Utility functions and helpers.

pub mod http;

use std::time::Duration;

/// Join a repository-relative base directory and a path below it.
///
/// Base directories are configured either empty or with a trailing slash;
/// both forms are accepted.
pub fn repo_path(base_dir: &str, path: &str) -> String {
    let base = base_dir.trim_matches('/');
    let path = path.trim_matches('/');
    match (base.is_empty(), path.is_empty()) {
        (true, _) => path.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{base}/{path}"),
    }
}

/// Sleep for a fixed number of seconds; zero returns immediately.
pub async fn pause(secs: u64) {
    if secs > 0 {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }
}
