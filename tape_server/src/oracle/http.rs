//! HTTP price oracle.
//!
//! Issues a GET against a URL template with a `{symbol}` placeholder and returns the
//! response body as the oracle answer. Any text endpoint that answers with a price
//! (a plain quote service or a model gateway asked for "the current price of X") fits.

use std::time::Duration;

use log::debug;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use tape_common::{Result, Symbol, TapeError};

use super::PriceOracle;

/// Placeholder replaced with the symbol in the URL template.
pub const SYMBOL_PLACEHOLDER: &str = "{symbol}";

/// Blocking HTTP oracle.
#[derive(Debug, Clone)]
pub struct HttpOracle {
    client: Client,
    url_template: String,
}

impl HttpOracle {
    /// Builds an oracle for `url_template`, which must contain `{symbol}`.
    pub fn new(url_template: &str, request_timeout: Duration) -> Result<Self> {
        if !url_template.contains(SYMBOL_PLACEHOLDER) {
            return Err(TapeError::Format(format!(
                "Oracle URL template `{}` has no {} placeholder",
                url_template, SYMBOL_PLACEHOLDER
            )));
        }

        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TapeError::Format(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url_template: url_template.to_string(),
        })
    }

    /// The request URL for `symbol`.
    pub fn url_for(&self, symbol: &Symbol) -> String {
        render_url(&self.url_template, symbol)
    }
}

fn render_url(template: &str, symbol: &Symbol) -> String {
    template.replace(SYMBOL_PLACEHOLDER, symbol.as_str())
}

impl PriceOracle for HttpOracle {
    fn lookup(&self, symbol: &Symbol) -> Result<String> {
        let url = self.url_for(symbol);
        debug!("Oracle GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| TapeError::oracle(symbol.as_str(), e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TapeError::oracle(symbol.as_str(), "rate limited by upstream"));
        }
        if !status.is_success() {
            return Err(TapeError::oracle(
                symbol.as_str(),
                format!("request failed with status {}", status),
            ));
        }

        response
            .text()
            .map_err(|e| TapeError::oracle(symbol.as_str(), e.to_string()))
    }
}
