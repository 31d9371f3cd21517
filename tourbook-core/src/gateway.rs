use crate::{CoreError, CoreResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// Status reported by the processor for a payment intent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::RequiresPaymentMethod => "requires_payment_method",
            IntentStatus::RequiresConfirmation => "requires_confirmation",
            IntentStatus::RequiresAction => "requires_action",
            IntentStatus::Processing => "processing",
            IntentStatus::RequiresCapture => "requires_capture",
            IntentStatus::Canceled => "canceled",
            IntentStatus::Succeeded => "succeeded",
            IntentStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateCustomer {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct CreateIntent {
    /// Minor currency units (×100)
    pub amount_minor: i64,
    pub currency: String,
    pub customer_id: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String, // Provider's ID (e.g., pi_123)
    pub status: IntentStatus,
    pub amount_minor: i64,
    pub client_secret: Option<String>,
    pub latest_charge: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
    pub payment_intent: Option<String>,
    pub created: i64,
    /// Full processor payload, passed through to admin views.
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceAmount {
    pub amount_minor: i64,
    pub currency: String,
}

/// Funds held at the processor, per currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub available: Vec<BalanceAmount>,
    pub pending: Vec<BalanceAmount>,
    pub raw: serde_json::Value,
}

/// Contract of the external card processor. Injected everywhere it is
/// used, so tests can swap in [`MockPaymentGateway`].
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_customer(&self, customer: CreateCustomer) -> CoreResult<Customer>;

    async fn create_payment_intent(&self, request: CreateIntent) -> CoreResult<PaymentIntent>;

    async fn retrieve_payment_intent(&self, intent_id: &str) -> CoreResult<PaymentIntent>;

    async fn list_charges(&self, limit: u32) -> CoreResult<Vec<Charge>>;

    async fn retrieve_charge(&self, charge_id: &str) -> CoreResult<Option<Charge>>;

    async fn retrieve_balance(&self) -> CoreResult<Balance>;
}

/// Scriptable processor double. Intents start in `requires_payment_method`
/// and move only when a test calls [`MockPaymentGateway::set_intent_status`].
#[derive(Default)]
pub struct MockPaymentGateway {
    intents: Mutex<HashMap<String, PaymentIntent>>,
    charges: Mutex<Vec<Charge>>,
    sequence: AtomicU64,
    unavailable: AtomicBool,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as if the processor timed out.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_intent_status(&self, intent_id: &str, status: IntentStatus) {
        let mut intents = self.intents.lock().unwrap_or_else(|e| e.into_inner());
        let Some(intent) = intents.get_mut(intent_id) else {
            return;
        };
        intent.status = status;

        if status == IntentStatus::Succeeded && intent.latest_charge.is_none() {
            let charge_id = format!("ch_mock_{}", self.next_seq());
            intent.latest_charge = Some(charge_id.clone());
            let charge = Charge {
                id: charge_id.clone(),
                amount_minor: intent.amount_minor,
                currency: "pkr".to_string(),
                status: "succeeded".to_string(),
                payment_intent: Some(intent.id.clone()),
                created: chrono::Utc::now().timestamp(),
                raw: serde_json::json!({ "id": charge_id, "amount": intent.amount_minor }),
            };
            self.charges.lock().unwrap_or_else(|e| e.into_inner()).push(charge);
        }
    }

    fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn check_available(&self) -> CoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CoreError::GatewayError("processor request timed out".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_customer(&self, customer: CreateCustomer) -> CoreResult<Customer> {
        self.check_available()?;
        tracing::debug!("Mock processor creating customer {}", customer.name);
        Ok(Customer {
            id: format!("cus_mock_{}", self.next_seq()),
        })
    }

    async fn create_payment_intent(&self, request: CreateIntent) -> CoreResult<PaymentIntent> {
        self.check_available()?;
        let id = format!("pi_mock_{}", self.next_seq());
        let intent = PaymentIntent {
            id: id.clone(),
            status: IntentStatus::RequiresPaymentMethod,
            amount_minor: request.amount_minor,
            client_secret: Some(format!("{}_secret", id)),
            latest_charge: None,
        };
        self.intents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_payment_intent(&self, intent_id: &str) -> CoreResult<PaymentIntent> {
        self.check_available()?;
        self.intents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(intent_id)
            .cloned()
            .ok_or_else(|| CoreError::GatewayError(format!("No such payment_intent: {}", intent_id)))
    }

    async fn list_charges(&self, limit: u32) -> CoreResult<Vec<Charge>> {
        self.check_available()?;
        let charges = self.charges.lock().unwrap_or_else(|e| e.into_inner());
        Ok(charges.iter().rev().take(limit as usize).cloned().collect())
    }

    async fn retrieve_charge(&self, charge_id: &str) -> CoreResult<Option<Charge>> {
        self.check_available()?;
        let charges = self.charges.lock().unwrap_or_else(|e| e.into_inner());
        Ok(charges.iter().find(|c| c.id == charge_id).cloned())
    }

    /// Every succeeded charge counts as available; nothing is ever pending.
    async fn retrieve_balance(&self) -> CoreResult<Balance> {
        self.check_available()?;
        let charges = self.charges.lock().unwrap_or_else(|e| e.into_inner());
        let mut totals: BTreeMap<String, i64> = BTreeMap::new();
        for charge in charges.iter().filter(|c| c.status == "succeeded") {
            *totals.entry(charge.currency.clone()).or_default() += charge.amount_minor;
        }
        let available: Vec<BalanceAmount> = totals
            .into_iter()
            .map(|(currency, amount_minor)| BalanceAmount { amount_minor, currency })
            .collect();
        let raw = serde_json::json!({
            "object": "balance",
            "available": available
                .iter()
                .map(|a| serde_json::json!({ "amount": a.amount_minor, "currency": a.currency }))
                .collect::<Vec<_>>(),
            "pending": [],
        });
        Ok(Balance {
            available,
            pending: Vec::new(),
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent_request() -> CreateIntent {
        CreateIntent {
            amount_minor: 3_000_000,
            currency: "pkr".to_string(),
            customer_id: "cus_1".to_string(),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_mock_intent_lifecycle() {
        let gateway = MockPaymentGateway::new();
        let intent = gateway.create_payment_intent(intent_request()).await.unwrap();
        assert_eq!(intent.status, IntentStatus::RequiresPaymentMethod);
        assert!(intent.client_secret.is_some());

        gateway.set_intent_status(&intent.id, IntentStatus::Succeeded);
        let fetched = gateway.retrieve_payment_intent(&intent.id).await.unwrap();
        assert_eq!(fetched.status, IntentStatus::Succeeded);

        let charge_id = fetched.latest_charge.unwrap();
        let charge = gateway.retrieve_charge(&charge_id).await.unwrap().unwrap();
        assert_eq!(charge.amount_minor, 3_000_000);
        assert_eq!(gateway.list_charges(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_balance_sums_settled_charges() {
        let gateway = MockPaymentGateway::new();
        assert!(gateway.retrieve_balance().await.unwrap().available.is_empty());

        for _ in 0..2 {
            let intent = gateway.create_payment_intent(intent_request()).await.unwrap();
            gateway.set_intent_status(&intent.id, IntentStatus::Succeeded);
        }
        let open = gateway.create_payment_intent(intent_request()).await.unwrap();
        gateway.set_intent_status(&open.id, IntentStatus::Processing);

        let balance = gateway.retrieve_balance().await.unwrap();
        assert_eq!(
            balance.available,
            vec![BalanceAmount {
                amount_minor: 6_000_000,
                currency: "pkr".to_string()
            }]
        );
        assert!(balance.pending.is_empty());
        assert_eq!(balance.raw["available"][0]["amount"], 6_000_000);
    }

    #[tokio::test]
    async fn test_mock_unavailable() {
        let gateway = MockPaymentGateway::new();
        gateway.set_unavailable(true);
        let result = gateway.create_payment_intent(intent_request()).await;
        assert!(matches!(result, Err(CoreError::GatewayError(_))));
    }

    #[test]
    fn test_unknown_intent_status_deserializes() {
        let status: IntentStatus = serde_json::from_str("\"requires_something_new\"").unwrap();
        assert_eq!(status, IntentStatus::Unknown);
    }
}
