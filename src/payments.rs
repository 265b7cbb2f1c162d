//! # Payment gateway
//!
//! The gateway is an external collaborator: we create a gateway-side order
//! for an invoice total, the client completes payment against the gateway,
//! and the gateway calls back with `(gateway_order_id, payment_id,
//! signature)`. The signature is HMAC-SHA256 over
//! `"{gateway_order_id}|{payment_id}"` with a shared webhook secret,
//! hex-encoded. We only mark an invoice paid after that check passes, and
//! the completion path is idempotent because gateways redeliver callbacks.

use anyhow::{Context, Error};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount_cents: i64,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Register an order with the gateway and return its reference. The
    /// receipt ties the gateway order back to our invoice.
    async fn create_order(&self, amount_cents: i64, receipt: &str) -> Result<GatewayOrder, Error>;
}

/// Real gateway over HTTP.
pub struct HttpGateway {
    base_url: String,
    client: Client,
}

impl HttpGateway {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn create_order(&self, amount_cents: i64, receipt: &str) -> Result<GatewayOrder, Error> {
        #[derive(Serialize)]
        struct CreateOrder<'a> {
            amount: i64,
            currency: &'a str,
            receipt: &'a str,
        }

        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .json(&CreateOrder {
                amount: amount_cents,
                currency: "INR",
                receipt,
            })
            .send()
            .await
            .context("gateway order creation request failed")?
            .error_for_status()
            .context("gateway rejected order creation")?;

        response
            .json::<GatewayOrder>()
            .await
            .context("malformed gateway order response")
    }
}

/// Local stand-in used when no gateway URL is configured and in tests.
/// Issues a unique reference without leaving the process.
pub struct LocalGateway;

#[async_trait]
impl PaymentGateway for LocalGateway {
    async fn create_order(&self, amount_cents: i64, _receipt: &str) -> Result<GatewayOrder, Error> {
        Ok(GatewayOrder {
            id: format!("gw_{}", Uuid::new_v4().simple()),
            amount_cents,
        })
    }
}

#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
}

impl SignatureVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.to_string(),
        }
    }

    pub fn verify(&self, gateway_order_id: &str, payment_id: &str, signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(format!("{gateway_order_id}|{payment_id}").as_bytes());

        mac.verify_slice(&expected).is_ok()
    }

    #[cfg(test)]
    pub fn sign(&self, gateway_order_id: &str, payment_id: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(format!("{gateway_order_id}|{payment_id}").as_bytes());

        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_signature_verifies() {
        let verifier = SignatureVerifier::new("test-secret");
        let signature = verifier.sign("gw_abc", "pay_123");

        assert!(verifier.verify("gw_abc", "pay_123", &signature));
    }

    #[test]
    fn tampered_fields_fail() {
        let verifier = SignatureVerifier::new("test-secret");
        let signature = verifier.sign("gw_abc", "pay_123");

        assert!(!verifier.verify("gw_abc", "pay_999", &signature));
        assert!(!verifier.verify("gw_xyz", "pay_123", &signature));
        assert!(!verifier.verify("gw_abc", "pay_123", "not-hex"));
        assert!(!verifier.verify("gw_abc", "pay_123", "deadbeef"));
    }

    #[test]
    fn different_secret_fails() {
        let signer = SignatureVerifier::new("secret-a");
        let verifier = SignatureVerifier::new("secret-b");
        let signature = signer.sign("gw_abc", "pay_123");

        assert!(!verifier.verify("gw_abc", "pay_123", &signature));
    }

    #[tokio::test]
    async fn local_gateway_issues_unique_references() {
        let gateway = LocalGateway;

        let a = gateway.create_order(25_000, "inv_1").await.unwrap();
        let b = gateway.create_order(25_000, "inv_2").await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.amount_cents, 25_000);
    }
}
