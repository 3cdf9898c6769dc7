use crate::config::StripeConfig;
use crate::domain::ports::{Authorization, AuthorizationRequest, PaymentGateway};
use crate::error::{EscrowError, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    id: String,
    client_secret: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
    code: Option<String>,
}

/// Payment gateway backed by Stripe payment intents with manual capture.
pub struct StripeGateway {
    client: Client,
    config: StripeConfig,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EscrowError::Gateway(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    async fn post(&self, path: &str, form: &[(String, String)]) -> Result<PaymentIntent> {
        let response = self
            .client
            .post(self.url(path))
            .basic_auth(&self.config.secret_key, None::<&str>)
            .form(form)
            .send()
            .await
            .map_err(|e| EscrowError::Gateway(format!("request failed: {}", e)))?;
        parse_intent(response).await
    }

    async fn fetch(&self, authorization_id: &str) -> Result<PaymentIntent> {
        let response = self
            .client
            .get(self.url(&format!("/v1/payment_intents/{}", authorization_id)))
            .basic_auth(&self.config.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| EscrowError::Gateway(format!("request failed: {}", e)))?;
        parse_intent(response).await
    }

    /// Posts `action` for the intent. A rejected call still succeeds when the
    /// intent already reached the `settled` status.
    async fn settle(&self, authorization_id: &str, action: &str, settled: &str) -> Result<()> {
        let path = format!("/v1/payment_intents/{}/{}", authorization_id, action);
        let error = match self.post(&path, &[]).await {
            Ok(_) => return Ok(()),
            Err(e) => e,
        };
        match self.fetch(authorization_id).await {
            Ok(intent) if intent.status.as_deref() == Some(settled) => {
                debug!(authorization_id, action, "payment intent already settled");
                Ok(())
            }
            _ => Err(error),
        }
    }
}

async fn parse_intent(response: Response) -> Result<PaymentIntent> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(ApiErrorBody {
                error: ApiError { message, code },
            }) => match (message, code) {
                (Some(message), Some(code)) => format!("{} ({})", message, code),
                (Some(message), None) => message,
                (None, Some(code)) => code,
                (None, None) => body,
            },
            Err(_) => body,
        };
        return Err(EscrowError::Gateway(format!(
            "processor returned {}: {}",
            status.as_u16(),
            message
        )));
    }
    response
        .json()
        .await
        .map_err(|e| EscrowError::Gateway(format!("malformed processor response: {}", e)))
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn authorize(&self, request: &AuthorizationRequest) -> Result<Authorization> {
        let mut form = vec![
            (
                "amount".to_string(),
                request.money.amount.minor_units()?.to_string(),
            ),
            (
                "currency".to_string(),
                request.money.currency.as_str().to_string(),
            ),
            ("capture_method".to_string(), "manual".to_string()),
            ("description".to_string(), request.description.clone()),
        ];
        for (key, value) in &request.metadata {
            form.push((format!("metadata[{}]", key), value.clone()));
        }

        let intent = self.post("/v1/payment_intents", &form).await?;
        Ok(Authorization {
            id: intent.id,
            client_secret: intent.client_secret,
        })
    }

    async fn capture(&self, authorization_id: &str) -> Result<()> {
        self.settle(authorization_id, "capture", "succeeded").await
    }

    async fn cancel(&self, authorization_id: &str) -> Result<()> {
        self.settle(authorization_id, "cancel", "canceled").await
    }
}
