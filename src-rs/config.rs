use std::time::Duration;

pub const DEFAULT_MODEL_ID: &str = "anthropic.claude-3-sonnet-20240229-v1:0";
pub const DEFAULT_PROMPT: &str = "How are you today?";
pub const DEFAULT_MAX_TOKENS: u32 = 2000;
pub const DEFAULT_TEMPERATURE: f64 = 0.0;

#[derive(Clone, Debug, PartialEq)]
pub struct CallConfig {
    pub model_id: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub region: Option<String>,
    pub profile: Option<String>,
    pub endpoint_url: Option<String>,
    pub timeout: Option<Duration>,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            region: None,
            profile: None,
            endpoint_url: None,
            timeout: None,
        }
    }
}
