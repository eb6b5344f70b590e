use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::credentials::{CredentialsError, EnvLookup};

pub type Section = HashMap<String, String>;

pub const DEFAULT_PROFILE: &str = "default";

pub fn selected_profile(env: EnvLookup, profile_override: Option<&str>) -> String {
    profile_override
        .map(|p| p.to_string())
        .or_else(|| env("AWS_PROFILE"))
        .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
}

pub fn credentials_path(env: EnvLookup) -> Option<PathBuf> {
    env("AWS_SHARED_CREDENTIALS_FILE")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(".aws").join("credentials")))
}

pub fn config_path(env: EnvLookup) -> Option<PathBuf> {
    env("AWS_CONFIG_FILE")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(".aws").join("config")))
}

/// Parses the INI dialect of `~/.aws/credentials` and `~/.aws/config`.
/// `[profile name]` headers are folded to `name`.
pub fn parse(text: &str) -> HashMap<String, Section> {
    let mut sections: HashMap<String, Section> = HashMap::new();
    let mut current: Option<String> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let header = header.trim();
            let name = header
                .strip_prefix("profile ")
                .map(str::trim)
                .unwrap_or(header)
                .to_string();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }
        let Some(name) = current.as_ref() else {
            continue;
        };
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim().to_lowercase();
            let value = value.trim().to_string();
            if let Some(section) = sections.get_mut(name) {
                section.insert(key, value);
            }
        }
    }

    sections
}

/// Missing files read as "no section"; any other read failure is an error.
pub fn load_section(path: &Path, profile: &str) -> Result<Option<Section>, CredentialsError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(CredentialsError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    Ok(parse(&text).remove(profile))
}
