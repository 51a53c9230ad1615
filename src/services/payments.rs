//! Wallet payment confirmation.
//!
//! Deposits are credited only after the wallet's payment API reports the
//! referenced payment as successful.

use crate::types::SettlementAsset;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Final state of a wallet payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Success,
    Failed,
    Cancelled,
    /// Not final yet, or unknown to the payment API
    Pending,
}

/// Confirms wallet payments by reference.
#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    async fn confirm(&self, reference: &str, asset: SettlementAsset, amount: Decimal) -> PaymentStatus;
}

/// Token symbols the payment API reports for an asset.
fn payment_tokens(asset: SettlementAsset) -> &'static [&'static str] {
    match asset {
        SettlementAsset::Usdc => &["USDCE", "USDC"],
        SettlementAsset::Wld => &["WLD"],
    }
}

/// On-chain decimals; the payment API reports amounts in base units.
fn token_decimals(asset: SettlementAsset) -> u32 {
    match asset {
        SettlementAsset::Usdc => 6,
        SettlementAsset::Wld => 18,
    }
}

/// Convert a whole-token amount to base units.
fn to_base_units(asset: SettlementAsset, amount: Decimal) -> Option<Decimal> {
    amount.checked_mul(Decimal::from(10u64.pow(token_decimals(asset))))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentRecord {
    #[serde(alias = "transactionStatus")]
    status: String,
    #[serde(default)]
    input_token: Option<String>,
    /// Amount paid, in base units
    #[serde(default)]
    input_token_amount: Option<String>,
}

impl PaymentRecord {
    fn status(&self) -> PaymentStatus {
        match self.status.to_lowercase().as_str() {
            "success" | "mined" | "completed" => PaymentStatus::Success,
            "failed" => PaymentStatus::Failed,
            "cancelled" | "canceled" => PaymentStatus::Cancelled,
            _ => PaymentStatus::Pending,
        }
    }

    /// Whether the record covers the claimed asset and whole-token amount.
    /// A record without a token or amount covers nothing.
    fn matches(&self, asset: SettlementAsset, amount: Decimal) -> bool {
        let Some(token) = self.input_token.as_deref() else {
            return false;
        };
        if !payment_tokens(asset).iter().any(|t| t.eq_ignore_ascii_case(token.trim())) {
            return false;
        }

        let paid = self
            .input_token_amount
            .as_deref()
            .and_then(|a| a.trim().parse::<Decimal>().ok());
        match (paid, to_base_units(asset, amount)) {
            (Some(paid), Some(claimed)) => paid >= claimed,
            _ => false,
        }
    }
}

/// Payment verifier backed by the wallet's payment API.
pub struct HttpPaymentVerifier {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpPaymentVerifier {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn fetch(&self, reference: &str) -> Result<PaymentRecord, reqwest::Error> {
        let url = format!("{}/transactions/{}", self.base_url, reference);
        debug!("Confirming payment: {}", url);

        let mut request = self.client.get(&url);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        request.send().await?.error_for_status()?.json().await
    }
}

#[async_trait]
impl PaymentVerifier for HttpPaymentVerifier {
    async fn confirm(&self, reference: &str, asset: SettlementAsset, amount: Decimal) -> PaymentStatus {
        match self.fetch(reference).await {
            Ok(record) => {
                let status = record.status();
                if status == PaymentStatus::Success && !record.matches(asset, amount) {
                    warn!("Payment {} does not cover {} {}", reference, amount, asset);
                    return PaymentStatus::Failed;
                }
                status
            }
            Err(e) => {
                warn!("Payment lookup for {} failed: {}", reference, e);
                PaymentStatus::Pending
            }
        }
    }
}

/// Accepts every payment. Development only.
pub struct AcceptAllPayments;

#[async_trait]
impl PaymentVerifier for AcceptAllPayments {
    async fn confirm(&self, reference: &str, _asset: SettlementAsset, _amount: Decimal) -> PaymentStatus {
        debug!("Accepting payment {} without confirmation", reference);
        PaymentStatus::Success
    }
}
