use std::time::Duration;

use clap::Parser;

use crate::config::{CallConfig, DEFAULT_MAX_TOKENS, DEFAULT_MODEL_ID, DEFAULT_PROMPT, DEFAULT_TEMPERATURE};

/// Send one Converse request to Amazon Bedrock and print the reply message as JSON
#[derive(Parser, Debug)]
#[command(name = "converse-call", version, about, long_about = None)]
pub struct Args {
    /// Model id or inference profile ARN
    #[arg(long, env = "CONVERSE_MODEL_ID", default_value = DEFAULT_MODEL_ID)]
    pub model: String,

    /// Text of the single user message
    #[arg(long, env = "CONVERSE_PROMPT", default_value = DEFAULT_PROMPT)]
    pub prompt: String,

    /// Maximum number of tokens to generate
    #[arg(long, env = "CONVERSE_MAX_TOKENS", default_value_t = DEFAULT_MAX_TOKENS)]
    pub max_tokens: u32,

    /// Sampling temperature
    #[arg(long, env = "CONVERSE_TEMPERATURE", default_value_t = DEFAULT_TEMPERATURE)]
    pub temperature: f64,

    /// AWS region (otherwise AWS_REGION, AWS_DEFAULT_REGION, or the profile)
    #[arg(long)]
    pub region: Option<String>,

    /// Named profile from the shared AWS config files
    #[arg(long)]
    pub profile: Option<String>,

    /// Override the bedrock-runtime endpoint
    #[arg(long)]
    pub endpoint_url: Option<String>,

    /// Request timeout in seconds; the call waits indefinitely when unset
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Log request details to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn into_config(self) -> CallConfig {
        CallConfig {
            model_id: self.model,
            prompt: self.prompt,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            region: self.region,
            profile: self.profile,
            endpoint_url: self.endpoint_url,
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}
