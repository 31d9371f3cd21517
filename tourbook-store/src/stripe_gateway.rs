use crate::app_config::GatewayConfig;
use crate::error::StoreError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tourbook_core::gateway::{
    Balance, BalanceAmount, Charge, CreateCustomer, CreateIntent, Customer, IntentStatus, PaymentGateway,
    PaymentIntent,
};
use tourbook_core::{CoreError, CoreResult};
use tracing::{info, instrument, warn};

/// Stripe over its form-encoded REST API
#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct IntentResponse {
    id: String,
    status: IntentStatus,
    amount: i64,
    client_secret: Option<String>,
    latest_charge: Option<String>,
}

impl From<IntentResponse> for PaymentIntent {
    fn from(r: IntentResponse) -> Self {
        PaymentIntent {
            id: r.id,
            status: r.status,
            amount_minor: r.amount,
            client_secret: r.client_secret,
            latest_charge: r.latest_charge,
        }
    }
}

#[derive(Deserialize)]
struct ChargeList {
    data: Vec<Value>,
}

impl StripeGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            secret_key: config.secret_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> CoreResult<reqwest::Response> {
        let response = request
            .basic_auth(&self.secret_key, Some(""))
            .send()
            .await
            .map_err(|e| CoreError::GatewayError(format!("Stripe API error: {}", e)))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        warn!("Stripe API returned {}: {}", status, body);
        Err(CoreError::GatewayError(error_message(status, &body)))
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> CoreResult<T> {
        response
            .json()
            .await
            .map_err(|e| CoreError::GatewayError(format!("Failed to parse Stripe response: {}", e)))
    }
}

/// Pull `error.message` out of a Stripe error body when there is one.
fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| format!("Stripe returned {}", status))
}

fn balance_amounts(entries: &Value) -> Vec<BalanceAmount> {
    entries
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .map(|entry| BalanceAmount {
                    amount_minor: entry["amount"].as_i64().unwrap_or_default(),
                    currency: entry["currency"].as_str().unwrap_or_default().to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Map a balance object; the raw payload goes along unchanged.
pub fn balance_from_value(raw: Value) -> Balance {
    Balance {
        available: balance_amounts(&raw["available"]),
        pending: balance_amounts(&raw["pending"]),
        raw,
    }
}

/// Map a charge object, keeping the full payload for admin views.
pub fn charge_from_value(raw: Value) -> CoreResult<Charge> {
    let id = raw["id"]
        .as_str()
        .ok_or_else(|| CoreError::GatewayError("charge without id".to_string()))?
        .to_string();

    Ok(Charge {
        id,
        amount_minor: raw["amount"].as_i64().unwrap_or_default(),
        currency: raw["currency"].as_str().unwrap_or_default().to_string(),
        status: raw["status"].as_str().unwrap_or_default().to_string(),
        payment_intent: raw["payment_intent"].as_str().map(str::to_string),
        created: raw["created"].as_i64().unwrap_or_default(),
        raw,
    })
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, customer))]
    async fn create_customer(&self, customer: CreateCustomer) -> CoreResult<Customer> {
        let params = [
            ("name", customer.name),
            ("email", customer.email),
            ("phone", customer.phone),
        ];
        let response = self.send(self.client.post(self.url("customers")).form(&params)).await?;
        Self::parse(response).await
    }

    #[instrument(skip(self, request), fields(amount = request.amount_minor))]
    async fn create_payment_intent(&self, request: CreateIntent) -> CoreResult<PaymentIntent> {
        let mut params = vec![
            ("amount".to_string(), request.amount_minor.to_string()),
            ("currency".to_string(), request.currency),
            ("customer".to_string(), request.customer_id),
            ("automatic_payment_methods[enabled]".to_string(), "true".to_string()),
        ];
        for (key, value) in request.metadata {
            params.push((format!("metadata[{}]", key), value));
        }

        let response = self
            .send(self.client.post(self.url("payment_intents")).form(&params))
            .await?;
        let intent: IntentResponse = Self::parse(response).await?;
        info!("PaymentIntent created: {}", intent.id);
        Ok(intent.into())
    }

    async fn retrieve_payment_intent(&self, intent_id: &str) -> CoreResult<PaymentIntent> {
        let response = self
            .send(self.client.get(self.url(&format!("payment_intents/{}", intent_id))))
            .await?;
        let intent: IntentResponse = Self::parse(response).await?;
        Ok(intent.into())
    }

    async fn list_charges(&self, limit: u32) -> CoreResult<Vec<Charge>> {
        let response = self
            .send(self.client.get(self.url("charges")).query(&[("limit", limit.clamp(1, 100))]))
            .await?;
        let list: ChargeList = Self::parse(response).await?;
        list.data.into_iter().map(charge_from_value).collect()
    }

    async fn retrieve_charge(&self, charge_id: &str) -> CoreResult<Option<Charge>> {
        let response = self
            .client
            .get(self.url(&format!("charges/{}", charge_id)))
            .basic_auth(&self.secret_key, Some(""))
            .send()
            .await
            .map_err(|e| CoreError::GatewayError(format!("Stripe API error: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::GatewayError(error_message(status, &body)));
        }

        let raw: Value = Self::parse(response).await?;
        charge_from_value(raw).map(Some)
    }

    async fn retrieve_balance(&self) -> CoreResult<Balance> {
        let response = self.send(self.client.get(self.url("balance"))).await?;
        let raw: Value = Self::parse(response).await?;
        Ok(balance_from_value(raw))
    }
}
