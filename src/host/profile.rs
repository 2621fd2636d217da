use std::path::{Path, PathBuf};

pub const DEFAULT_PROFILE: &str = "Default";

/// On-disk locations belonging to one named profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilePaths {
    pub name: String,
    pub root: PathBuf,
    /// Chrome `--user-data-dir`.
    pub browser_dir: PathBuf,
    /// Persisted configuration.
    pub store_path: PathBuf,
}

/// Resolve the directories for `profile_name`.
///
/// Default base: `dirs::data_dir()/autoclick/`
/// Per-profile dir: `<base>/<sanitized-profile>/`
///
/// If `base_override` is provided, it replaces the base directory.
pub fn resolve_profile(
    profile_name: Option<&str>,
    base_override: Option<&Path>,
) -> Result<ProfilePaths, Box<dyn std::error::Error + Send + Sync>> {
    let base = match base_override {
        Some(p) => p.to_path_buf(),
        None => {
            let data_dir = dirs::data_dir().ok_or("could not determine data directory")?;
            data_dir.join("autoclick")
        }
    };

    let name = sanitize_profile_name(profile_name.unwrap_or(DEFAULT_PROFILE));
    let root = base.join(&name);
    Ok(ProfilePaths {
        browser_dir: root.join("browser"),
        store_path: root.join("store.json"),
        name,
        root,
    })
}

fn sanitize_profile_name(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        DEFAULT_PROFILE.to_string()
    } else {
        sanitized
    }
}
