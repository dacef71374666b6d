use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::domain::status::TerminalStatus;

pub const DEFAULT_BASE_URL: &str = "https://api.vendista.ru:99";
const REQUEST_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct TerminalInfo {
    pub status: TerminalStatus,
    pub serial_number: Option<String>,
    pub last_online_time: Option<String>,
}

/// Read side of the Vendista terminals API. Credential handling is the
/// implementation's concern; callers only see statuses.
#[async_trait]
pub trait StatusSource: Send + Sync + 'static {
    async fn get_status(&self, terminal_id: i64) -> Result<TerminalStatus, VendistaError>;
    async fn get_info(&self, terminal_id: i64) -> Result<TerminalInfo, VendistaError>;
}

#[derive(Debug, Error)]
pub enum VendistaError {
    #[error("failed to build vendista http client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("vendista request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("vendista rejected the request with authorization status {0}")]
    Unauthorized(StatusCode),
    #[error("vendista reported an unsuccessful lookup for terminal {0}")]
    LookupFailed(i64),
    #[error("unknown terminal status code {0}")]
    UnknownStatusCode(i64),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct TerminalEnvelope {
    item: TerminalItem,
    #[serde(default)]
    success: bool,
}

#[derive(Debug, Deserialize)]
struct TerminalItem {
    state: i64,
    #[serde(default)]
    serial_number: Option<String>,
    #[serde(default)]
    last_online_time: Option<String>,
}

impl TerminalItem {
    fn into_info(self) -> Result<TerminalInfo, VendistaError> {
        let status = TerminalStatus::from_code(self.state)
            .ok_or(VendistaError::UnknownStatusCode(self.state))?;
        Ok(TerminalInfo {
            status,
            serial_number: self.serial_number,
            last_online_time: self.last_online_time,
        })
    }
}

#[derive(Debug)]
pub struct VendistaClient {
    http: reqwest::Client,
    base_url: String,
    login: String,
    password: String,
    token: Mutex<Option<String>>,
}

impl VendistaClient {
    pub fn new(base_url: &str, login: &str, password: &str) -> Result<Self, VendistaError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()
            .map_err(VendistaError::ClientBuild)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            login: login.to_string(),
            password: password.to_string(),
            token: Mutex::new(None),
        })
    }

    /// Exchanges the login/password pair for a fresh bearer token and caches it.
    pub async fn authenticate(&self) -> Result<(), VendistaError> {
        let response = self
            .http
            .get(format!("{}/token", self.base_url))
            .query(&[("login", self.login.as_str()), ("password", self.password.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(VendistaError::Unauthorized(status));
        }

        let body: TokenResponse = response.error_for_status()?.json().await?;
        *self.token.lock().await = Some(body.token);
        Ok(())
    }

    async fn current_token(&self) -> Result<String, VendistaError> {
        if let Some(token) = self.token.lock().await.clone() {
            return Ok(token);
        }
        self.authenticate().await?;
        let token = self.token.lock().await.clone();
        token.ok_or(VendistaError::Unauthorized(StatusCode::UNAUTHORIZED))
    }

    /// Fetches a terminal, re-authenticating once on an authorization failure
    /// before giving up.
    async fn fetch_item(&self, terminal_id: i64) -> Result<TerminalItem, VendistaError> {
        match self.fetch_item_once(terminal_id).await {
            Err(VendistaError::Unauthorized(_)) => {
                self.authenticate().await?;
                self.fetch_item_once(terminal_id).await
            }
            other => other,
        }
    }

    async fn fetch_item_once(&self, terminal_id: i64) -> Result<TerminalItem, VendistaError> {
        let token = self.current_token().await?;
        let response = self
            .http
            .get(format!("{}/terminals/{terminal_id}", self.base_url))
            .query(&[("token", token.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(VendistaError::Unauthorized(status));
        }

        let envelope: TerminalEnvelope = response.error_for_status()?.json().await?;
        if !envelope.success {
            return Err(VendistaError::LookupFailed(terminal_id));
        }

        Ok(envelope.item)
    }
}

#[async_trait]
impl StatusSource for VendistaClient {
    async fn get_status(&self, terminal_id: i64) -> Result<TerminalStatus, VendistaError> {
        let item = self.fetch_item(terminal_id).await?;
        TerminalStatus::from_code(item.state).ok_or(VendistaError::UnknownStatusCode(item.state))
    }

    async fn get_info(&self, terminal_id: i64) -> Result<TerminalInfo, VendistaError> {
        self.fetch_item(terminal_id).await?.into_info()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    use super::{StatusSource, TerminalEnvelope, VendistaClient, VendistaError};
    use crate::domain::status::TerminalStatus;

    #[test]
    fn deserializes_terminal_envelope() {
        let payload = r#"{
            "item": {
                "id": 171552,
                "state": 2,
                "serial_number": "VND-0042",
                "last_online_time": "2024-05-01T10:00:00"
            },
            "success": true
        }"#;

        let envelope: TerminalEnvelope =
            serde_json::from_str(payload).expect("envelope should parse");

        assert!(envelope.success);
        assert_eq!(envelope.item.state, 2);
        let info = envelope.item.into_info().expect("state code is known");
        assert_eq!(info.status, TerminalStatus::Inactive);
        assert_eq!(info.serial_number.as_deref(), Some("VND-0042"));
    }

    #[test]
    fn unknown_state_code_is_an_error() {
        let payload = r#"{"item": {"state": 9}, "success": true}"#;
        let envelope: TerminalEnvelope =
            serde_json::from_str(payload).expect("envelope should parse");

        let result = envelope.item.into_info();
        assert!(matches!(result, Err(VendistaError::UnknownStatusCode(9))));
    }

    /// Minimal scripted HTTP responder: answers one request per accepted
    /// connection with the next canned response and records the request line.
    fn spawn_responder(responses: Vec<(u16, &'static str)>) -> (u16, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("responder should bind");
        let port = listener.local_addr().expect("addr should resolve").port();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            for (code, body) in responses {
                let (mut stream, _) = match listener.accept() {
                    Ok(accepted) => accepted,
                    Err(_) => break,
                };

                let mut buffer = [0_u8; 4096];
                let mut request = Vec::new();
                loop {
                    let size = match stream.read(&mut buffer) {
                        Ok(0) | Err(_) => break,
                        Ok(size) => size,
                    };
                    request.extend_from_slice(&buffer[..size]);
                    if request.windows(4).any(|window| window == b"\r\n\r\n") {
                        break;
                    }
                }

                let request_line = String::from_utf8_lossy(&request)
                    .lines()
                    .next()
                    .unwrap_or_default()
                    .to_string();
                let _ = tx.send(request_line);

                let reason = if code == 200 { "OK" } else { "Unauthorized" };
                let response = format!(
                    "HTTP/1.1 {code} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });

        (port, rx)
    }

    #[tokio::test]
    async fn reauthenticates_once_on_authorization_failure() {
        let (port, requests) = spawn_responder(vec![
            (200, r#"{"token": "first", "user_id": 1}"#),
            (401, r#"{}"#),
            (200, r#"{"token": "second", "user_id": 1}"#),
            (200, r#"{"item": {"state": 0}, "success": true}"#),
        ]);

        let client = VendistaClient::new(&format!("http://127.0.0.1:{port}"), "user", "secret")
            .expect("client should build");

        let status = client.get_status(5).await.expect("status should resolve");
        assert_eq!(status, TerminalStatus::Online);

        let lines: Vec<String> = requests.try_iter().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("GET /token?"));
        assert!(lines[1].contains("/terminals/5?token=first"));
        assert!(lines[2].starts_with("GET /token?"));
        assert!(lines[3].contains("/terminals/5?token=second"));
    }

    #[tokio::test]
    async fn second_authorization_failure_propagates() {
        let (port, _requests) = spawn_responder(vec![
            (200, r#"{"token": "first", "user_id": 1}"#),
            (401, r#"{}"#),
            (200, r#"{"token": "second", "user_id": 1}"#),
            (403, r#"{}"#),
        ]);

        let client = VendistaClient::new(&format!("http://127.0.0.1:{port}"), "user", "secret")
            .expect("client should build");

        let result = client.get_status(5).await;
        assert!(matches!(result, Err(VendistaError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn unsuccessful_lookup_is_surfaced() {
        let (port, _requests) = spawn_responder(vec![
            (200, r#"{"token": "first", "user_id": 1}"#),
            (200, r#"{"item": {"state": 0}, "success": false}"#),
        ]);

        let client = VendistaClient::new(&format!("http://127.0.0.1:{port}"), "user", "secret")
            .expect("client should build");

        let result = client.get_info(171552).await;
        assert!(matches!(result, Err(VendistaError::LookupFailed(171552))));
    }
}
