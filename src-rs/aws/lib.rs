pub mod credentials;
pub mod process;
pub mod profile;
pub mod remote;
pub mod sigv4;

pub use credentials::{process_env, resolve_credentials, resolve_region, Credentials, CredentialsError, EnvLookup, StaticCredentials};
