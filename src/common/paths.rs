//! Configuration and report paths
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/infratest/`
//! - macOS: `~/Library/Application Support/infratest/`
//! - Windows: `%APPDATA%\infratest\`

use std::path::{Component, Path, PathBuf};

const APP_NAME: &str = "infratest";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Resolve `path` against `base` when relative, then drop `.` and `..`
/// components lexically (the target may not exist yet)
pub fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    };

    let mut cleaned = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !cleaned.pop() {
                    cleaned.push("..");
                }
            }
            other => cleaned.push(other.as_os_str()),
        }
    }

    if cleaned.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        cleaned
    }
}

/// Derive a module name from a working directory, skipping generic
/// segments like `terraform`
///
/// `./terraform/vpc` -> `vpc`, `/abs/terraform/ec2/ec2` -> `ec2`
pub fn module_name(working_dir: &Path) -> String {
    let normalized = working_dir.to_string_lossy().replace('\\', "/");
    normalized
        .split('/')
        .rev()
        .find(|part| !part.is_empty() && !matches!(*part, "terraform" | "." | ".."))
        .map(str::to_string)
        .unwrap_or_else(|| "default".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_is_valid() {
        let dir = config_dir();
        assert!(dir.is_some());
    }

    #[test]
    fn test_resolve_relative_cleans_components() {
        let base = Path::new("/flows/vpc");
        assert_eq!(
            resolve_relative(base, Path::new("./../terraform/vpc")),
            PathBuf::from("/flows/terraform/vpc")
        );
        assert_eq!(
            resolve_relative(base, Path::new("/abs/dir")),
            PathBuf::from("/abs/dir")
        );
        assert_eq!(resolve_relative(Path::new(""), Path::new(".")), PathBuf::from("."));
    }

    #[test]
    fn test_module_name() {
        assert_eq!(module_name(Path::new("./terraform/vpc")), "vpc");
        assert_eq!(module_name(Path::new("./terraform/ec2/ec2")), "ec2");
        assert_eq!(module_name(Path::new("/abs/path/terraform/vpc/")), "vpc");
        assert_eq!(module_name(Path::new("terraform")), "default");
    }
}
