//! Provider request and response types.

use serde::Deserialize;

/// One line of a checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItemRequest {
    /// Provider price id.
    pub price: String,
    pub quantity: u32,
}

/// Parameters for creating a checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub success_url: String,
    pub cancel_url: String,
    /// Our checkout id, echoed back on the session.
    pub client_reference_id: String,
    pub customer_email: Option<String>,
    pub line_items: Vec<LineItemRequest>,
}

impl SessionRequest {
    /// Form fields in the provider's bracketed encoding.
    #[must_use]
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_owned(), "payment".to_owned()),
            ("success_url".to_owned(), self.success_url.clone()),
            ("cancel_url".to_owned(), self.cancel_url.clone()),
            (
                "client_reference_id".to_owned(),
                self.client_reference_id.clone(),
            ),
        ];
        if let Some(email) = &self.customer_email {
            form.push(("customer_email".to_owned(), email.clone()));
        }
        for (i, item) in self.line_items.iter().enumerate() {
            form.push((format!("line_items[{i}][price]"), item.price.clone()));
            form.push((format!("line_items[{i}][quantity]"), item.quantity.to_string()));
        }
        form
    }
}

/// A checkout session as returned by the provider.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    /// Hosted payment page. Absent once the session is complete or expired.
    #[serde(default)]
    pub url: Option<String>,
    /// `paid`, `unpaid` or `no_payment_required`.
    pub payment_status: String,
    /// `open`, `complete` or `expired`.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub amount_total: Option<i64>,
}

impl CheckoutSession {
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }
}

/// A product search result page.
#[derive(Debug, Deserialize)]
pub(crate) struct SearchPage<T> {
    pub data: Vec<T>,
}

/// A provider product. Only the default price matters here.
#[derive(Debug, Deserialize)]
pub(crate) struct ProviderProduct {
    #[serde(default)]
    pub default_price: Option<PriceRef>,
}

/// A price reference, either bare or expanded.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum PriceRef {
    Id(String),
    Expanded { id: String },
}

impl PriceRef {
    pub(crate) fn into_id(self) -> String {
        match self {
            Self::Id(id) | Self::Expanded { id } => id,
        }
    }
}

/// Error body returned with non-2xx statuses.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// A webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// The events the storefront acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Payment page finished; may still be unpaid for delayed methods.
    SessionCompleted(CheckoutSession),
    /// The session timed out without payment.
    SessionExpired(CheckoutSession),
    /// Anything else; acknowledged and ignored.
    Other,
}

impl WebhookEvent {
    /// Classify the event and decode its session payload.
    ///
    /// # Errors
    ///
    /// Returns a `serde_json::Error` if a checkout event does not carry a session.
    pub fn kind(&self) -> Result<EventKind, serde_json::Error> {
        let session = || serde_json::from_value::<CheckoutSession>(self.data.object.clone());
        Ok(match self.event_type.as_str() {
            "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
                EventKind::SessionCompleted(session()?)
            }
            "checkout.session.expired" => EventKind::SessionExpired(session()?),
            _ => EventKind::Other,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_session_form_encoding() {
        let request = SessionRequest {
            success_url: "https://shop.test/checkout/success?session_id={CHECKOUT_SESSION_ID}"
                .to_string(),
            cancel_url: "https://shop.test/checkout/cancel".to_string(),
            client_reference_id: "42".to_string(),
            customer_email: None,
            line_items: vec![
                LineItemRequest {
                    price: "price_a".to_string(),
                    quantity: 2,
                },
                LineItemRequest {
                    price: "price_b".to_string(),
                    quantity: 1,
                },
            ],
        };
        let form = request.to_form();
        let get = |key: &str| {
            form.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("mode"), Some("payment"));
        assert_eq!(get("client_reference_id"), Some("42"));
        assert_eq!(get("line_items[0][price]"), Some("price_a"));
        assert_eq!(get("line_items[0][quantity]"), Some("2"));
        assert_eq!(get("line_items[1][price]"), Some("price_b"));
        assert_eq!(get("customer_email"), None);
    }

    #[test]
    fn test_price_ref_forms() {
        let bare: ProviderProduct = serde_json::from_value(json!({"default_price": "price_1"})).unwrap();
        let expanded: ProviderProduct =
            serde_json::from_value(json!({"default_price": {"id": "price_2", "unit_amount": 500}}))
                .unwrap();
        assert_eq!(bare.default_price.unwrap().into_id(), "price_1");
        assert_eq!(expanded.default_price.unwrap().into_id(), "price_2");
    }

    #[test]
    fn test_event_kind() {
        let event: WebhookEvent = serde_json::from_value(json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {"id": "cs_1", "payment_status": "paid", "url": null}}
        }))
        .unwrap();
        match event.kind().unwrap() {
            EventKind::SessionCompleted(session) => {
                assert_eq!(session.id, "cs_1");
                assert!(session.is_paid());
            }
            other => panic!("unexpected {other:?}"),
        }

        let other: WebhookEvent = serde_json::from_value(json!({
            "id": "evt_2",
            "type": "customer.created",
            "data": {"object": {"id": "cus_1"}}
        }))
        .unwrap();
        assert_eq!(other.kind().unwrap(), EventKind::Other);
    }
}
