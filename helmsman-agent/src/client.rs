use helmsman_core::error::{HelmsmanError, HelmsmanResult};
use helmsman_core::types::{RegisterRequest, RegisterResponse, ReportRequest};
use std::time::Duration;

/// Thin typed client for the manager's control-plane API.
pub struct ManagerClient {
    base_url: String,
    http: reqwest::Client,
}

impl ManagerClient {
    pub fn new(base_url: &str) -> HelmsmanResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub async fn register(&self, request: &RegisterRequest) -> HelmsmanResult<RegisterResponse> {
        let url = format!("{}/api/register", self.base_url);
        let response: RegisterResponse = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await?
            .json()
            .await?;

        if response.status != "success" {
            return Err(HelmsmanError::Network(
                response
                    .message
                    .unwrap_or_else(|| "Registration rejected".to_string()),
            ));
        }
        Ok(response)
    }

    pub async fn report(&self, request: &ReportRequest) -> HelmsmanResult<()> {
        let url = format!("{}/api/report", self.base_url);
        let envelope: serde_json::Value = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await?
            .json()
            .await?;

        if envelope.get("status").and_then(|s| s.as_str()) == Some("success") {
            Ok(())
        } else {
            let message = envelope
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("Report rejected");
            Err(HelmsmanError::Network(message.to_string()))
        }
    }

    pub async fn heartbeat(&self, node_id: &str) -> HelmsmanResult<()> {
        let url = format!("{}/api/heartbeat/{}", self.base_url, node_id);
        self.http.post(&url).send().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalised() {
        let client = ManagerClient::new("http://10.0.0.1:8080/").unwrap();
        assert_eq!(client.base_url, "http://10.0.0.1:8080");
    }
}
