use std::env;
use std::fmt;
use std::path::PathBuf;

use log::debug;

use super::profile::{self, Section};
use super::{process, remote};

pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Reads a process environment variable, treating blank values as unset.
pub fn process_env(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("no AWS credentials found for profile `{profile}` (checked env, shared files, container and instance metadata)")]
    NotFound { profile: String },
    #[error("profile `{profile}` is missing `{key}`")]
    Incomplete { profile: String, key: &'static str },
    #[error("{present} is set but {missing} is not")]
    IncompleteEnv {
        present: &'static str,
        missing: &'static str,
    },
    #[error("profile `{profile}` uses `{key}`, which this tool does not resolve; export keys or use credential_process")]
    Unsupported { profile: String, key: &'static str },
    #[error("credential_process `{command}` failed: {message}")]
    Process { command: String, message: String },
    #[error("{provider} credentials: {message}")]
    Remote {
        provider: &'static str,
        message: String,
    },
    #[error("no AWS region configured; set AWS_REGION or pass --region")]
    MissingRegion,
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone, PartialEq, Eq)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &self.session_token.as_ref().map(|_| "** redacted **"))
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Bedrock API key, sent as `Authorization: Bearer`.
    Bearer(String),
    /// IAM keys, used for SigV4.
    Static(StaticCredentials),
}

impl Credentials {
    pub fn kind(&self) -> &'static str {
        match self {
            Credentials::Bearer(_) => "bearer",
            Credentials::Static(_) => "sigv4",
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Bearer(_) => f.write_str("Bearer(** redacted **)"),
            Credentials::Static(creds) => f.debug_tuple("Static").field(creds).finish(),
        }
    }
}

const UNSUPPORTED_KEYS: [&str; 4] = ["role_arn", "sso_session", "sso_start_url", "web_identity_token_file"];

/// Ambient credential chain, first match wins:
/// 1. `AWS_BEARER_TOKEN_BEDROCK`
/// 2. `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` / `AWS_SESSION_TOKEN`
/// 3. static keys of the selected profile (credentials file, then config file)
/// 4. the profile's `credential_process`
/// 5. container credentials (`AWS_CONTAINER_CREDENTIALS_*`)
/// 6. EC2 instance metadata (IMDSv2)
///
/// Assume-role, SSO and web-identity profiles are rejected with
/// [`CredentialsError::Unsupported`].
pub fn resolve_credentials(
    env: EnvLookup,
    profile_override: Option<&str>,
) -> Result<Credentials, CredentialsError> {
    if let Some(token) = env("AWS_BEARER_TOKEN_BEDROCK") {
        return Ok(Credentials::Bearer(token));
    }
    if let Some(creds) = from_env(env)? {
        return Ok(Credentials::Static(creds));
    }

    let profile_name = profile::selected_profile(env, profile_override);
    let mut sections = Vec::new();
    for path in [profile::credentials_path(env), profile::config_path(env)].iter().flatten() {
        if let Some(section) = profile::load_section(path, &profile_name)? {
            sections.push(section);
        }
    }

    for section in &sections {
        if let Some(&key) = UNSUPPORTED_KEYS.iter().find(|key| section.contains_key(**key)) {
            return Err(CredentialsError::Unsupported {
                profile: profile_name,
                key,
            });
        }
    }
    for section in &sections {
        if let Some(creds) = from_section(section, &profile_name)? {
            return Ok(Credentials::Static(creds));
        }
    }
    for section in &sections {
        if let Some(command) = section.get("credential_process") {
            debug!("running credential_process for profile {}", profile_name);
            return process::run_credential_process(command).map(Credentials::Static);
        }
    }

    if let Some(creds) = remote::container_credentials(env)? {
        return Ok(Credentials::Static(creds));
    }
    if let Some(creds) = remote::instance_credentials(env)? {
        return Ok(Credentials::Static(creds));
    }

    Err(CredentialsError::NotFound {
        profile: profile_name,
    })
}

fn from_env(env: EnvLookup) -> Result<Option<StaticCredentials>, CredentialsError> {
    match (env("AWS_ACCESS_KEY_ID"), env("AWS_SECRET_ACCESS_KEY")) {
        (None, None) => Ok(None),
        (Some(_), None) => Err(CredentialsError::IncompleteEnv {
            present: "AWS_ACCESS_KEY_ID",
            missing: "AWS_SECRET_ACCESS_KEY",
        }),
        (None, Some(_)) => Err(CredentialsError::IncompleteEnv {
            present: "AWS_SECRET_ACCESS_KEY",
            missing: "AWS_ACCESS_KEY_ID",
        }),
        (Some(access_key_id), Some(secret_access_key)) => Ok(Some(StaticCredentials {
            access_key_id,
            secret_access_key,
            session_token: env("AWS_SESSION_TOKEN"),
        })),
    }
}

fn from_section(
    section: &Section,
    profile: &str,
) -> Result<Option<StaticCredentials>, CredentialsError> {
    let access_key_id = section.get("aws_access_key_id");
    let secret_access_key = section.get("aws_secret_access_key");
    match (access_key_id, secret_access_key) {
        (None, None) => Ok(None),
        (Some(_), None) => Err(CredentialsError::Incomplete {
            profile: profile.to_string(),
            key: "aws_secret_access_key",
        }),
        (None, Some(_)) => Err(CredentialsError::Incomplete {
            profile: profile.to_string(),
            key: "aws_access_key_id",
        }),
        (Some(id), Some(secret)) => Ok(Some(StaticCredentials {
            access_key_id: id.clone(),
            secret_access_key: secret.clone(),
            session_token: section.get("aws_session_token").cloned(),
        })),
    }
}

/// Region precedence: explicit override, `AWS_REGION`, `AWS_DEFAULT_REGION`,
/// then `region` from the selected profile in the config file.
pub fn resolve_region(
    env: EnvLookup,
    region_override: Option<&str>,
    profile_override: Option<&str>,
) -> Result<String, CredentialsError> {
    if let Some(region) = region_override.filter(|r| !r.trim().is_empty()) {
        return Ok(region.trim().to_string());
    }
    if let Some(region) = env("AWS_REGION").or_else(|| env("AWS_DEFAULT_REGION")) {
        return Ok(region);
    }
    let profile_name = profile::selected_profile(env, profile_override);
    if let Some(path) = profile::config_path(env) {
        if let Some(region) = profile::load_section(&path, &profile_name)?
            .and_then(|section| section.get("region").cloned())
        {
            return Ok(region);
        }
    }
    Err(CredentialsError::MissingRegion)
}
