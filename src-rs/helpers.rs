use log::debug;

use crate::aws::{self, CredentialsError, EnvLookup};
use crate::config::CallConfig;
use crate::llm::{BedrockAdapter, BedrockConfig, ProviderError};

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Endpoint precedence: `--endpoint-url`, `AWS_ENDPOINT_URL_BEDROCK_RUNTIME`,
/// `AWS_ENDPOINT_URL`, then the regional default.
pub fn resolve_endpoint(cfg: &CallConfig, env: EnvLookup, region: &str) -> String {
    cfg.endpoint_url
        .clone()
        .or_else(|| env("AWS_ENDPOINT_URL_BEDROCK_RUNTIME"))
        .or_else(|| env("AWS_ENDPOINT_URL"))
        .unwrap_or_else(|| format!("https://bedrock-runtime.{}.amazonaws.com", region))
}

pub fn build_adapter(cfg: &CallConfig) -> Result<BedrockAdapter, SetupError> {
    build_adapter_with(cfg, &aws::process_env)
}

pub fn build_adapter_with(cfg: &CallConfig, env: EnvLookup) -> Result<BedrockAdapter, SetupError> {
    let profile = cfg.profile.as_deref();
    let region = aws::resolve_region(env, cfg.region.as_deref(), profile)?;
    let credentials = aws::resolve_credentials(env, profile)?;
    let endpoint = resolve_endpoint(cfg, env, &region);
    debug!("bedrock endpoint {} in {}", endpoint, region);

    let adapter = BedrockAdapter::new(BedrockConfig {
        region,
        endpoint,
        credentials,
        timeout: cfg.timeout,
    })?;
    Ok(adapter)
}
