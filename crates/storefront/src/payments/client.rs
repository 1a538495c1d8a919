//! REST client for the payment provider.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument};

use super::types::{ApiErrorBody, CheckoutSession, ProviderProduct, SearchPage, SessionRequest};
use super::{PaymentError, PaymentGateway};
use crate::config::PaymentsConfig;

/// Client for the provider's checkout and product APIs.
///
/// Price lookups are cached for 5 minutes.
#[derive(Clone)]
pub struct PaymentsClient {
    inner: Arc<PaymentsClientInner>,
}

struct PaymentsClientInner {
    client: reqwest::Client,
    api_base: String,
    secret_key: SecretString,
    prices: Cache<String, String>,
}

impl std::fmt::Debug for PaymentsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentsClient")
            .field("api_base", &self.inner.api_base)
            .field("secret_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl PaymentsClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Request` if the HTTP client cannot be built.
    pub fn new(config: &PaymentsConfig) -> Result<Self, PaymentError> {
        let prices = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            inner: Arc::new(PaymentsClientInner {
                client,
                api_base: config.api_base.clone(),
                secret_key: config.secret_key.clone(),
                prices,
            }),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.inner.api_base)
    }

    /// Send a request and decode a JSON body, mapping error statuses.
    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, PaymentError> {
        let response = request
            .bearer_auth(self.inner.secret_key.expose_secret())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body).map_or_else(
                |_| body.chars().take(200).collect::<String>(),
                |e| match (e.error.kind, e.error.message) {
                    (Some(kind), Some(message)) => format!("{kind}: {message}"),
                    (None, Some(message)) => message,
                    (Some(kind), None) => kind,
                    (None, None) => "unknown error".to_string(),
                },
            );
            tracing::error!(status = %status, message = %message, "Payment provider returned an error");
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse payment provider response"
            );
            PaymentError::Response(e.to_string())
        })
    }

    async fn search_price(&self, product_name: &str) -> Result<String, PaymentError> {
        let query = price_search_query(product_name);
        let page: SearchPage<ProviderProduct> = self
            .send(
                self.inner
                    .client
                    .get(self.url("/v1/products/search"))
                    .query(&[("query", query.as_str()), ("limit", "1")]),
            )
            .await?;

        page.data
            .into_iter()
            .next()
            .and_then(|product| product.default_price)
            .map(super::types::PriceRef::into_id)
            .ok_or_else(|| PaymentError::PriceNotFound(product_name.to_owned()))
    }
}

impl PaymentGateway for PaymentsClient {
    #[instrument(skip(self))]
    async fn price_for(&self, product_name: &str) -> Result<String, PaymentError> {
        if let Some(price) = self.inner.prices.get(product_name).await {
            debug!("Price cache hit");
            return Ok(price);
        }

        let price = self.search_price(product_name).await?;
        self.inner
            .prices
            .insert(product_name.to_owned(), price.clone())
            .await;
        Ok(price)
    }

    #[instrument(skip_all, fields(client_reference_id = %request.client_reference_id))]
    async fn create_session(&self, request: &SessionRequest) -> Result<CheckoutSession, PaymentError> {
        let session: CheckoutSession = self
            .send(
                self.inner
                    .client
                    .post(self.url("/v1/checkout/sessions"))
                    .form(&request.to_form()),
            )
            .await?;
        debug!(session_id = %session.id, "Checkout session created");
        Ok(session)
    }

    #[instrument(skip(self))]
    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, PaymentError> {
        if session_id.is_empty() || !session_id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
            return Err(PaymentError::Response(format!(
                "malformed session id '{session_id}'"
            )));
        }
        self.send(
            self.inner
                .client
                .get(self.url(&format!("/v1/checkout/sessions/{session_id}"))),
        )
        .await
    }
}

/// Search expression for an active product with exactly this name.
fn price_search_query(product_name: &str) -> String {
    let escaped = product_name.replace('\\', "\\\\").replace('"', "\\\"");
    format!("active:\"true\" AND name:\"{escaped}\"")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> PaymentsConfig {
        PaymentsConfig {
            api_base: "https://payments.test".to_string(),
            secret_key: SecretString::from("sk_test_4eC39HqLyjWDarjtT1zdp7dc"),
            webhook_secret: None,
        }
    }

    #[test]
    fn test_price_search_query() {
        assert_eq!(
            price_search_query("Canvas Tote"),
            r#"active:"true" AND name:"Canvas Tote""#
        );
        assert_eq!(
            price_search_query(r#"12" Ruler"#),
            r#"active:"true" AND name:"12\" Ruler""#
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let client = PaymentsClient::new(&config()).unwrap();
        let debug = format!("{client:?}");
        assert!(debug.contains("payments.test"));
        assert!(!debug.contains("sk_test"));
    }

    #[tokio::test]
    async fn test_malformed_session_id_rejected_locally() {
        let client = PaymentsClient::new(&config()).unwrap();
        let err = client.retrieve_session("../v1/charges").await.unwrap_err();
        assert!(matches!(err, PaymentError::Response(_)));
    }

    #[tokio::test]
    async fn test_cached_price_skips_network() {
        let client = PaymentsClient::new(&config()).unwrap();
        client
            .inner
            .prices
            .insert("Mug".to_string(), "price_mug".to_string())
            .await;
        assert_eq!(client.price_for("Mug").await.unwrap(), "price_mug");
    }
}
