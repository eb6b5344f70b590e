use std::fs;
use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;

use super::credentials::{CredentialsError, EnvLookup, StaticCredentials};

const CONTAINER_HOST: &str = "http://169.254.170.2";
const IMDS_ENDPOINT: &str = "http://169.254.169.254";
const IMDS_TOKEN_TTL: &str = "21600";
const FETCH_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RemoteCredentials {
    access_key_id: String,
    secret_access_key: String,
    token: Option<String>,
}

impl From<RemoteCredentials> for StaticCredentials {
    fn from(remote: RemoteCredentials) -> Self {
        Self {
            access_key_id: remote.access_key_id,
            secret_access_key: remote.secret_access_key,
            session_token: remote.token,
        }
    }
}

fn remote_error(provider: &'static str, message: String) -> CredentialsError {
    CredentialsError::Remote { provider, message }
}

fn client(provider: &'static str) -> Result<Client, CredentialsError> {
    Client::builder()
        .timeout(FETCH_TIMEOUT)
        .no_proxy()
        .build()
        .map_err(|err| remote_error(provider, err.to_string()))
}

/// `AWS_CONTAINER_CREDENTIALS_RELATIVE_URI` is resolved against the ECS agent
/// address; otherwise `AWS_CONTAINER_CREDENTIALS_FULL_URI` is used as is.
pub fn container_endpoint(env: EnvLookup) -> Option<String> {
    env("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI")
        .map(|relative| format!("{}{}", CONTAINER_HOST, relative))
        .or_else(|| env("AWS_CONTAINER_CREDENTIALS_FULL_URI"))
}

fn container_token(env: EnvLookup) -> Result<Option<String>, CredentialsError> {
    if let Some(path) = env("AWS_CONTAINER_AUTHORIZATION_TOKEN_FILE") {
        let token = fs::read_to_string(&path).map_err(|source| CredentialsError::Io {
            path: path.into(),
            source,
        })?;
        return Ok(Some(token.trim().to_string()));
    }
    Ok(env("AWS_CONTAINER_AUTHORIZATION_TOKEN"))
}

/// ECS/EKS container credentials. `None` when no container endpoint is set.
pub fn container_credentials(env: EnvLookup) -> Result<Option<StaticCredentials>, CredentialsError> {
    let Some(endpoint) = container_endpoint(env) else {
        return Ok(None);
    };
    debug!("fetching container credentials from {}", endpoint);

    let mut request = client("container")?.get(&endpoint);
    if let Some(token) = container_token(env)? {
        request = request.header("authorization", token);
    }
    let resp = request
        .send()
        .map_err(|err| remote_error("container", err.to_string()))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(remote_error("container", format!("http {} from {}", status.as_u16(), endpoint)));
    }
    let creds: RemoteCredentials = resp
        .json()
        .map_err(|err| remote_error("container", format!("invalid credentials document: {}", err)))?;
    Ok(Some(creds.into()))
}

pub fn imds_disabled(env: EnvLookup) -> bool {
    env("AWS_EC2_METADATA_DISABLED")
        .map(|value| value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// EC2 instance role credentials over IMDSv2. `None` when the metadata
/// service is unreachable or no role is attached.
pub fn instance_credentials(env: EnvLookup) -> Result<Option<StaticCredentials>, CredentialsError> {
    if imds_disabled(env) {
        return Ok(None);
    }
    let base = env("AWS_EC2_METADATA_SERVICE_ENDPOINT").unwrap_or_else(|| IMDS_ENDPOINT.to_string());
    let base = base.trim_end_matches('/');
    let client = client("imds")?;

    let token = match client
        .put(format!("{}/latest/api/token", base))
        .header("x-aws-ec2-metadata-token-ttl-seconds", IMDS_TOKEN_TTL)
        .send()
    {
        Ok(resp) if resp.status().is_success() => resp
            .text()
            .map_err(|err| remote_error("imds", err.to_string()))?,
        Ok(resp) => {
            return Err(remote_error("imds", format!("token request returned http {}", resp.status().as_u16())))
        }
        Err(err) => {
            debug!("instance metadata unreachable: {}", err);
            return Ok(None);
        }
    };

    let roles_url = format!("{}/latest/meta-data/iam/security-credentials/", base);
    let resp = client
        .get(&roles_url)
        .header("x-aws-ec2-metadata-token", token.as_str())
        .send()
        .map_err(|err| remote_error("imds", err.to_string()))?;
    if resp.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !resp.status().is_success() {
        return Err(remote_error("imds", format!("role listing returned http {}", resp.status().as_u16())));
    }
    let listing = resp.text().map_err(|err| remote_error("imds", err.to_string()))?;
    let Some(role) = listing.lines().map(str::trim).find(|line| !line.is_empty()) else {
        return Ok(None);
    };
    debug!("using instance role {}", role);

    let resp = client
        .get(format!("{}{}", roles_url, role))
        .header("x-aws-ec2-metadata-token", token.as_str())
        .send()
        .map_err(|err| remote_error("imds", err.to_string()))?;
    if !resp.status().is_success() {
        return Err(remote_error("imds", format!("role credentials returned http {}", resp.status().as_u16())));
    }
    let creds: RemoteCredentials = resp
        .json()
        .map_err(|err| remote_error("imds", format!("invalid credentials document: {}", err)))?;
    Ok(Some(creds.into()))
}
