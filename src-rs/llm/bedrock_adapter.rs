use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;
use reqwest::blocking::Client;
use reqwest::Url;
use serde_json::Value;

use super::types::{ConverseClient, ConverseRequest, ConverseResponse, ProviderError};
use crate::aws::sigv4::{self, SignableRequest, SigningParams};
use crate::aws::{Credentials, StaticCredentials};

const SIGNING_SERVICE: &str = "bedrock";

pub struct BedrockConfig {
    pub region: String,
    pub endpoint: String,
    pub credentials: Credentials,
    pub timeout: Option<Duration>,
}

pub struct BedrockAdapter {
    cfg: BedrockConfig,
    base: Url,
    host: String,
    client: Client,
}

impl BedrockAdapter {
    pub fn new(cfg: BedrockConfig) -> Result<Self, ProviderError> {
        let base = Url::parse(&cfg.endpoint).map_err(|err| {
            ProviderError::new("config_error", &format!("invalid endpoint {}: {}", cfg.endpoint, err), false)
        })?;
        let host = match (base.host_str(), base.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(ProviderError::new(
                    "config_error",
                    &format!("endpoint has no host: {}", cfg.endpoint),
                    false,
                ))
            }
        };
        let client = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|err| ProviderError::new("config_error", &err.to_string(), false))?;
        Ok(Self { cfg, base, host, client })
    }

    pub fn region(&self) -> &str {
        &self.cfg.region
    }

    pub fn endpoint(&self) -> &str {
        &self.cfg.endpoint
    }

    /// SigV4 headers for a Converse POST, `x-amz-content-sha256` first and
    /// `authorization` last.
    fn signed_headers(
        &self,
        creds: &StaticCredentials,
        path: &str,
        body: &[u8],
        time: DateTime<Utc>,
    ) -> Vec<(String, String)> {
        let payload_hash = sigv4::payload_hash(body);
        let headers = [
            ("content-type", "application/json"),
            ("accept", "application/json"),
            ("x-amz-content-sha256", payload_hash.as_str()),
        ];
        let signable = SignableRequest {
            method: "POST",
            host: &self.host,
            path,
            query: &[],
            headers: &headers,
            body,
        };
        let params = SigningParams {
            credentials: creds,
            region: &self.cfg.region,
            service: SIGNING_SERVICE,
            time,
        };
        let mut out = vec![("x-amz-content-sha256".to_string(), payload_hash.clone())];
        out.extend(sigv4::sign(&signable, &params));
        out
    }
}

impl ConverseClient for BedrockAdapter {
    fn converse(&self, request: &ConverseRequest) -> Result<ConverseResponse, ProviderError> {
        let path = converse_path(self.base.path(), &request.model_id);
        let mut url = self.base.clone();
        url.set_path(&path);

        let body = serde_json::to_vec(request)
            .map_err(|err| ProviderError::new("serialize_error", &err.to_string(), false))?;

        let mut builder = self
            .client
            .post(url.clone())
            .header("host", self.host.as_str())
            .header("content-type", "application/json")
            .header("accept", "application/json");

        match &self.cfg.credentials {
            Credentials::Bearer(token) => {
                builder = builder.header("authorization", format!("Bearer {}", token));
            }
            Credentials::Static(creds) => {
                for (name, value) in self.signed_headers(creds, &path, &body, Utc::now()) {
                    builder = builder.header(name, value);
                }
            }
        }

        debug!(
            "POST {} (model {}, auth {})",
            url,
            request.model_id,
            self.cfg.credentials.kind()
        );

        let resp = builder
            .body(body)
            .send()
            .map_err(|err| ProviderError::new("network_error", &err.to_string(), true))?;

        let status = resp.status();
        let error_type = resp
            .headers()
            .get("x-amzn-errortype")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let text = resp.text().map_err(|err| {
            ProviderError::new("network_error", &format!("failed to read response body: {}", err), true)
        })?;
        if !status.is_success() {
            return Err(classify_error(status.as_u16(), error_type.as_deref(), &text));
        }

        serde_json::from_str(&text)
            .map_err(|err| ProviderError::new("parse_error", &format!("invalid converse response: {}", err), false))
    }
}

/// `/model/{modelId}/converse` under the endpoint's base path, with the model
/// id percent-encoded as one segment (`:` becomes `%3A`).
pub fn converse_path(base_path: &str, model_id: &str) -> String {
    format!(
        "{}/model/{}/converse",
        base_path.trim_end_matches('/'),
        urlencoding::encode(model_id)
    )
}

pub fn classify_error(status: u16, error_type: Option<&str>, body: &str) -> ProviderError {
    let kind = error_type
        .and_then(|t| t.split(':').next())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| {
            serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| v.get("__type").and_then(|t| t.as_str()).map(|t| t.to_string()))
        });
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("Message"))
                .and_then(|m| m.as_str())
                .map(|m| m.to_string())
        })
        .unwrap_or_else(|| body.to_string());
    let detail = match &kind {
        Some(kind) => format!("{} (http {}): {}", kind, status, message),
        None => format!("http {}: {}", status, message),
    };
    let kind = kind.unwrap_or_default();

    if status == 401 || status == 403 {
        return ProviderError::new("auth_error", &detail, false);
    }
    if status == 429 || kind == "ThrottlingException" {
        return ProviderError::new("rate_limit", &detail, true);
    }
    if status == 424 || kind == "ModelErrorException" {
        return ProviderError::new("model_error", &detail, false);
    }
    if (500..600).contains(&status) {
        return ProviderError::new("server_error", &detail, true);
    }
    ProviderError::new("api_error", &detail, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_id_is_one_encoded_segment() {
        assert_eq!(
            converse_path("/", "anthropic.claude-3-sonnet-20240229-v1:0"),
            "/model/anthropic.claude-3-sonnet-20240229-v1%3A0/converse"
        );
        assert_eq!(
            converse_path("/proxy/", "arn:aws:bedrock:us-east-1::foundation-model/x"),
            "/proxy/model/arn%3Aaws%3Abedrock%3Aus-east-1%3A%3Afoundation-model%2Fx/converse"
        );
    }

    #[test]
    fn classifies_by_status_and_error_type() {
        let err = classify_error(403, Some("AccessDeniedException:http://internal"), r#"{"message":"denied"}"#);
        assert_eq!(err.code, "auth_error");
        assert_eq!(err.message, "AccessDeniedException (http 403): denied");

        let err = classify_error(400, Some("ThrottlingException"), r#"{"message":"slow"}"#);
        assert_eq!(err.code, "rate_limit");
        assert!(err.retryable);

        let err = classify_error(429, None, "too many");
        assert_eq!(err.code, "rate_limit");
        assert_eq!(err.message, "http 429: too many");

        assert_eq!(classify_error(424, None, "").code, "model_error");
        assert_eq!(classify_error(503, Some("ServiceUnavailableException"), "{}").code, "server_error");

        let err = classify_error(400, None, r#"{"__type":"ValidationException","Message":"bad model"}"#);
        assert_eq!(err.code, "api_error");
        assert_eq!(err.message, "ValidationException (http 400): bad model");
        assert!(!err.retryable);
    }

    #[test]
    fn rejects_unparseable_endpoint() {
        let result = BedrockAdapter::new(BedrockConfig {
            region: "us-east-1".to_string(),
            endpoint: "not a url".to_string(),
            credentials: Credentials::Bearer("t".to_string()),
            timeout: None,
        });
        match result {
            Err(err) => assert_eq!(err.code, "config_error"),
            Ok(_) => panic!("expected config error"),
        }
    }

    #[test]
    fn converse_signature_is_pinned_for_a_fixed_time() {
        use chrono::TimeZone;

        let adapter = BedrockAdapter::new(BedrockConfig {
            region: "us-east-1".to_string(),
            endpoint: "https://bedrock-runtime.us-east-1.amazonaws.com".to_string(),
            credentials: Credentials::Bearer("unused".to_string()),
            timeout: None,
        })
        .unwrap();
        let creds = StaticCredentials {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
            session_token: None,
        };
        let request = crate::call::build_request(&crate::config::CallConfig::default());
        let body = serde_json::to_vec(&request).unwrap();
        assert_eq!(
            String::from_utf8(body.clone()).unwrap(),
            r#"{"messages":[{"role":"user","content":[{"text":"How are you today?"}]}],"inferenceConfig":{"maxTokens":2000,"temperature":0.0}}"#
        );
        let path = converse_path(adapter.base.path(), &request.model_id);
        let time = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();

        let headers = adapter.signed_headers(&creds, &path, &body, time);
        assert_eq!(
            headers,
            vec![
                (
                    "x-amz-content-sha256".to_string(),
                    "ddc805bfa50fd149baaba68b1ac5361c38cca785a44241871b575495c20dbcdc".to_string()
                ),
                ("x-amz-date".to_string(), "20150830T123600Z".to_string()),
                (
                    "authorization".to_string(),
                    "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/bedrock/aws4_request, \
                     SignedHeaders=accept;content-type;host;x-amz-content-sha256;x-amz-date, \
                     Signature=8c8078c3575505181b91077365fdde28a88da02c9c74f9d8168c286ecce479b1"
                        .to_string()
                ),
            ]
        );
    }

    #[test]
    fn host_keeps_explicit_port() {
        let adapter = BedrockAdapter::new(BedrockConfig {
            region: "us-east-1".to_string(),
            endpoint: "http://127.0.0.1:4566".to_string(),
            credentials: Credentials::Bearer("t".to_string()),
            timeout: None,
        })
        .unwrap();
        assert_eq!(adapter.host, "127.0.0.1:4566");
        assert_eq!(adapter.region(), "us-east-1");
    }
}
