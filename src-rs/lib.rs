pub mod call;
pub mod cli;
pub mod config;
pub mod helpers;
pub mod logging;
pub mod render;

#[path = "aws/lib.rs"]
pub mod aws;
#[path = "llm/lib.rs"]
pub mod llm;

pub use call::{build_request, run, CallError};
pub use config::CallConfig;
pub use helpers::{build_adapter, build_adapter_with, SetupError};
