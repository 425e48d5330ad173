//! Configuration and state directory resolution.

use std::path::PathBuf;

pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("NEUROMARK_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    dirs::config_dir()
        .map(|d| d.join("neuromark"))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".config").join("neuromark"))
                .unwrap_or_else(|| PathBuf::from(".neuromark"))
        })
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("NEUROMARK_CONFIG") {
        return PathBuf::from(path);
    }

    config_dir().join("config.toml")
}

/// State directory for tools, prompts, backups, and the sandbox scratch dir.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("NEUROMARK_STATE_DIR") {
        return PathBuf::from(dir);
    }

    dirs::data_dir()
        .map(|d| d.join("neuromark"))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".local").join("share").join("neuromark"))
                .unwrap_or_else(|| PathBuf::from(".neuromark"))
        })
}

pub fn workspace_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("NEUROMARK_WORKSPACE") {
        return PathBuf::from(dir);
    }

    state_dir().join("workspace")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_paths() {
        let _ = config_dir();
        let _ = config_path();
        let _ = state_dir();
        let _ = workspace_dir();
    }
}
