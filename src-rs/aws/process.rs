use std::process::Command;

use serde::Deserialize;

use super::credentials::{CredentialsError, StaticCredentials};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProcessOutput {
    version: u32,
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

/// Runs a profile's `credential_process` through the platform shell and
/// reads the version 1 JSON document it prints on stdout.
pub fn run_credential_process(command: &str) -> Result<StaticCredentials, CredentialsError> {
    let fail = |message: String| CredentialsError::Process {
        command: command.to_string(),
        message,
    };

    let output = shell(command).output().map_err(|err| fail(err.to_string()))?;
    if !output.status.success() {
        return Err(fail(format!(
            "exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let parsed: ProcessOutput = serde_json::from_slice(&output.stdout)
        .map_err(|err| fail(format!("invalid output: {}", err)))?;
    if parsed.version != 1 {
        return Err(fail(format!("unsupported Version {}", parsed.version)));
    }

    Ok(StaticCredentials {
        access_key_id: parsed.access_key_id,
        secret_access_key: parsed.secret_access_key,
        session_token: parsed.session_token,
    })
}

#[cfg(unix)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}
