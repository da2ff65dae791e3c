//! Invoice API client. Best effort: one POST, no retries.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub struct PaymentClient {
    api_url: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct InvoiceRequest<'a> {
    amount: u32,
    currency: &'a str,
    order_id: &'a str,
    description: &'a str,
}

#[derive(Deserialize, Debug)]
struct InvoiceResponse {
    invoice_url: Option<String>,
    error: Option<String>,
}

pub struct Invoice {
    pub invoice_url: String,
}

impl PaymentClient {
    pub fn new(api_url: String, api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");
        Self { api_url, api_key, client }
    }

    pub async fn create_invoice(
        &self,
        amount: u32,
        currency: &str,
        order_id: &str,
        description: &str,
    ) -> Result<Invoice, String> {
        let url = format!("{}/invoices", self.api_url.trim_end_matches('/'));
        info!("Creating invoice {} for {} {}", order_id, amount, currency);

        let request = InvoiceRequest { amount, currency, order_id, description };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let msg = format!("Invoice request failed: {e}");
                warn!("{}", msg);
                msg
            })?;

        let status = response.status();
        let body: InvoiceResponse = response.json().await.map_err(|e| {
            let msg = format!("Invalid invoice response ({status}): {e}");
            warn!("{}", msg);
            msg
        })?;

        if let Some(error) = body.error {
            let msg = format!("Invoice API error: {error}");
            warn!("{}", msg);
            return Err(msg);
        }

        match body.invoice_url {
            Some(invoice_url) => {
                info!("Invoice {} created", order_id);
                Ok(Invoice { invoice_url })
            }
            None => {
                let msg = format!("Invoice API returned no URL (status {status})");
                warn!("{}", msg);
                Err(msg)
            }
        }
    }
}
