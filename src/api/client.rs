use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use yansi::Paint;

use super::error::{ApiError, ApiResult};

static SILENT: AtomicBool = AtomicBool::new(false);

pub fn set_silent(silent: bool) {
    SILENT.store(silent, Ordering::Relaxed);
}

fn log_output(msg: String) {
    if !SILENT.load(Ordering::Relaxed) {
        tracing::debug!(target: "fleetdeck::http", "{}", msg);
    }
}

/// Typed HTTP transport for the fleet API.
///
/// One request per call, no retries. The bearer token is passed per call so
/// the session guard stays the single owner of the credential.
#[derive(Clone, Debug)]
pub struct FleetClient {
    client: reqwest::Client,
    api_base_url: String,
}

impl FleetClient {
    pub fn new(api_base_url: impl Into<String>, timeout: Duration) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("FleetDeck/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(client, api_base_url))
    }

    pub fn with_client(client: reqwest::Client, api_base_url: impl Into<String>) -> Self {
        Self {
            client,
            api_base_url: api_base_url.into(),
        }
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    /// Sends one request and decodes a JSON body of type `T`.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> ApiResult<T> {
        let text = self.send(method, endpoint, token, body).await?;
        serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Sends one command whose success body carries nothing the client needs.
    pub async fn send_command(
        &self,
        method: Method,
        endpoint: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> ApiResult<()> {
        self.send(method, endpoint, token, body).await.map(|_| ())
    }

    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> ApiResult<String> {
        let url = format!("{}{}", self.api_base_url, endpoint);
        log_request(&method, &url, token.is_some(), body);

        let mut req = self.client.request(method, &url);
        if let Some(t) = token.filter(|t| !t.is_empty()) {
            req = req.bearer_auth(t);
        }
        if let Some(b) = body {
            req = req.json(b);
        }

        let resp = req.send().await.map_err(|e| {
            log_output(format!("Response:\n{}", Paint::new(e.to_string()).red()));
            ApiError::Network(e.to_string())
        })?;
        let status = resp.status();
        let text = resp.text().await?;
        log_output(format!(
            "Response:\n{} {}",
            Paint::new(status.as_u16()).bold(),
            Paint::new(&text).rgb(100, 100, 100)
        ));

        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                message: rejection_message(status, &text),
            });
        }
        Ok(text)
    }
}

/// Server-provided reason of a refused request, or a status-based fallback.
pub fn rejection_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("HTTP {}", status))
}

fn log_request(method: &Method, url: &str, authenticated: bool, body: Option<&Value>) {
    let mut parts = Vec::new();
    parts.push(Paint::new("curl").green().bold().to_string());
    parts.push(format!("-X {}", Paint::new(method.as_str()).yellow().bold()));
    parts.push(format!("'{}'", Paint::new(url).cyan()));
    if authenticated {
        parts.push(format!(
            "{} {}",
            Paint::new("-H").magenta(),
            Paint::new("'Authorization: Bearer ***'").magenta()
        ));
    }
    if let Some(d) = body {
        let json_str = serde_json::to_string(&redact(d)).unwrap_or_default();
        parts.push(format!(
            "{} {}",
            Paint::new("-H").magenta(),
            Paint::new("'Content-Type: application/json'").magenta()
        ));
        parts.push(format!(
            "{} {}",
            Paint::new("-d").blue(),
            Paint::new(format!("'{}'", json_str.replace('\'', "'\\''"))).white()
        ));
    }
    log_output(format!("Request:\n{}", parts.join(" ")));
}

fn redact(body: &Value) -> Value {
    let mut copy = body.clone();
    if let Some(obj) = copy.as_object_mut() {
        if obj.contains_key("password") {
            obj.insert("password".into(), Value::String("***".into()));
        }
    }
    copy
}

/// Percent-encodes a path segment such as a technical name.
pub fn path_segment(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_uses_error_field_verbatim() {
        let msg = rejection_message(StatusCode::CONFLICT, r#"{"error": "VM busy"}"#);
        assert_eq!(msg, "VM busy");
    }

    #[test]
    fn rejection_falls_back_to_status() {
        let msg = rejection_message(StatusCode::INTERNAL_SERVER_ERROR, "<html>oops</html>");
        assert_eq!(msg, "HTTP 500 Internal Server Error");
    }

    #[test]
    fn passwords_are_not_logged() {
        let body = serde_json::json!({"name": "web1", "password": "hunter22"});
        assert_eq!(redact(&body)["password"], "***");
        assert_eq!(redact(&body)["name"], "web1");
    }

    #[test]
    fn technical_names_are_encoded() {
        assert_eq!(path_segment("u1 web/1"), "u1%20web%2F1");
    }
}
