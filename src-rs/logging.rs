use env_logger::{Builder, Env, Target};

/// `-v` turns on debug output for this crate; `RUST_LOG` overrides both.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "warn,converse_call_rs=debug"
    } else {
        "warn"
    }
}

/// Logs go to stderr; stdout is reserved for the reply JSON.
pub fn init(verbose: bool) {
    let _ = Builder::from_env(Env::default().default_filter_or(default_filter(verbose)))
        .target(Target::Stderr)
        .try_init();
}
