use std::io::{self, Write};

use log::{debug, info};

use crate::config::CallConfig;
use crate::llm::{ConverseClient, ConverseRequest, ConverseResponse, InferenceConfig, Message, ProviderError};
use crate::render;

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("inference call failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("failed to write reply: {0}")]
    Output(#[from] io::Error),
}

/// One user message holding one text block, plus the inference settings.
pub fn build_request(cfg: &CallConfig) -> ConverseRequest {
    ConverseRequest {
        model_id: cfg.model_id.clone(),
        messages: vec![Message::user_text(&cfg.prompt)],
        inference_config: InferenceConfig {
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
        },
    }
}

/// Sends the request once and writes `output.message` to `out`.
pub fn run<C, W>(client: &C, cfg: &CallConfig, out: &mut W) -> Result<ConverseResponse, CallError>
where
    C: ConverseClient + ?Sized,
    W: Write,
{
    let request = build_request(cfg);
    let response = client.converse(&request)?;

    if let Some(reason) = &response.stop_reason {
        info!("stop reason: {}", reason);
    }
    if let Some(usage) = &response.usage {
        info!(
            "tokens: {} in, {} out, {} total",
            usage.input_tokens, usage.output_tokens, usage.total_tokens
        );
    }
    if let Some(metrics) = &response.metrics {
        info!("latency: {}ms", metrics.latency_ms);
    }
    debug!("reply text: {}", response.text());

    render::write_message(out, &response.output.message)?;
    Ok(response)
}
