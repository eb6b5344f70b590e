pub mod bedrock_adapter;
pub mod types;

pub use bedrock_adapter::{BedrockAdapter, BedrockConfig};
pub use types::{
    ContentBlock, ConverseClient, ConverseRequest, ConverseResponse, InferenceConfig, Message, ProviderError, Role,
};
