use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use converse_call_rs::{build_adapter_with, run, CallConfig, CallError};

struct Captured {
    request_line: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

/// Serves exactly one HTTP response and hands back what the client sent.
fn serve_once(status: &'static str, extra_headers: &'static str, body: String) -> (String, JoinHandle<Captured>) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        extra_headers,
        body.len(),
        body
    );
    serve_raw(response)
}

/// Like `serve_once`, but writes `response` to the socket verbatim.
fn serve_raw(response: String) -> (String, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            let n = stream.read(&mut chunk).unwrap();
            assert!(n > 0, "client closed before sending headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap_or_default().to_string();
        let headers: HashMap<String, String> = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
            .collect();
        let length: usize = headers
            .get("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        while buf.len() < header_end + length {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        stream.write_all(response.as_bytes()).unwrap();
        stream.flush().unwrap();

        Captured {
            request_line,
            headers,
            body: buf[header_end..].to_vec(),
        }
    });

    (endpoint, handle)
}

fn env_for(endpoint: String, pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
    move |key: &str| {
        if key == "AWS_ENDPOINT_URL_BEDROCK_RUNTIME" {
            return Some(endpoint.clone());
        }
        pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
    }
}

#[test]
fn signed_call_prints_reply_message() {
    let message = json!({
        "role": "assistant",
        "content": [{"text": "I'm doing well, thank you for asking!"}]
    });
    let reply = json!({
        "output": {"message": message.clone()},
        "stopReason": "end_turn",
        "usage": {"inputTokens": 13, "outputTokens": 12, "totalTokens": 25},
        "metrics": {"latencyMs": 420}
    });
    let (endpoint, server) = serve_once("200 OK", "", reply.to_string());
    let env = env_for(
        endpoint,
        &[
            ("AWS_REGION", "us-east-1"),
            ("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE"),
            ("AWS_SECRET_ACCESS_KEY", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY"),
            ("AWS_SESSION_TOKEN", "session-token"),
        ],
    );

    let cfg = CallConfig::default();
    let adapter = build_adapter_with(&cfg, &env).unwrap();
    let mut out: Vec<u8> = Vec::new();
    run(&adapter, &cfg, &mut out).unwrap();

    let captured = server.join().unwrap();
    assert_eq!(
        captured.request_line,
        "POST /model/anthropic.claude-3-sonnet-20240229-v1%3A0/converse HTTP/1.1"
    );
    let auth = &captured.headers["authorization"];
    assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"), "{}", auth);
    assert!(auth.contains("/us-east-1/bedrock/aws4_request"), "{}", auth);
    assert_eq!(captured.headers["x-amz-security-token"], "session-token");
    assert!(captured.headers.contains_key("x-amz-date"));
    assert_eq!(
        captured.headers["x-amz-content-sha256"],
        hex::encode(Sha256::digest(&captured.body))
    );
    assert!(
        auth.contains("SignedHeaders=accept;content-type;host;x-amz-content-sha256;x-amz-date;x-amz-security-token,"),
        "{}",
        auth
    );

    let sent: Value = serde_json::from_slice(&captured.body).unwrap();
    assert_eq!(
        sent,
        json!({
            "messages": [{"role": "user", "content": [{"text": "How are you today?"}]}],
            "inferenceConfig": {"maxTokens": 2000, "temperature": 0.0}
        })
    );

    let expected = "{\n    \"role\": \"assistant\",\n    \"content\": [\n        {\n            \"text\": \"I'm doing well, thank you for asking!\"\n        }\n    ]\n}\n";
    assert_eq!(String::from_utf8(out).unwrap(), expected);
}

#[test]
fn bearer_token_is_sent_as_is() {
    let reply = json!({"output": {"message": {"role": "assistant", "content": [{"text": "ok"}]}}});
    let (endpoint, server) = serve_once("200 OK", "", reply.to_string());
    let env = env_for(
        endpoint,
        &[("AWS_REGION", "us-west-2"), ("AWS_BEARER_TOKEN_BEDROCK", "bedrock-api-key")],
    );

    let cfg = CallConfig::default();
    let adapter = build_adapter_with(&cfg, &env).unwrap();
    let mut out: Vec<u8> = Vec::new();
    run(&adapter, &cfg, &mut out).unwrap();

    let captured = server.join().unwrap();
    assert_eq!(captured.headers["authorization"], "Bearer bedrock-api-key");
    assert!(!captured.headers.contains_key("x-amz-date"));
}

#[test]
fn service_error_surfaces_without_output() {
    let (endpoint, server) = serve_once(
        "400 Bad Request",
        "x-amzn-ErrorType: ValidationException:http://internal.amazon.com/coral/com.amazon.bedrock/\r\n",
        json!({"message": "The provided model identifier is invalid."}).to_string(),
    );
    let env = env_for(
        endpoint,
        &[("AWS_REGION", "us-east-1"), ("AWS_BEARER_TOKEN_BEDROCK", "k")],
    );

    let cfg = CallConfig {
        model_id: "no-such-model".to_string(),
        ..CallConfig::default()
    };
    let adapter = build_adapter_with(&cfg, &env).unwrap();
    let mut out: Vec<u8> = Vec::new();
    let err = run(&adapter, &cfg, &mut out).unwrap_err();
    server.join().unwrap();

    assert!(out.is_empty());
    match err {
        CallError::Provider(err) => {
            assert_eq!(err.code, "api_error");
            assert_eq!(
                err.message,
                "ValidationException (http 400): The provided model identifier is invalid."
            );
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn truncated_reply_body_is_a_network_error() {
    let (endpoint, server) = serve_raw(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 500\r\nConnection: close\r\n\r\n{\"output\":".to_string(),
    );
    let env = env_for(
        endpoint,
        &[("AWS_REGION", "us-east-1"), ("AWS_BEARER_TOKEN_BEDROCK", "k")],
    );

    let cfg = CallConfig::default();
    let adapter = build_adapter_with(&cfg, &env).unwrap();
    let mut out: Vec<u8> = Vec::new();
    let err = run(&adapter, &cfg, &mut out).unwrap_err();
    server.join().unwrap();

    assert!(out.is_empty());
    match err {
        CallError::Provider(err) => {
            assert_eq!(err.code, "network_error");
            assert!(err.message.starts_with("failed to read response body"), "{}", err.message);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}
