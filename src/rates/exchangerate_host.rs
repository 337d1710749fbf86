use crate::core::{Currency, RateDate, RateError, RateProvider};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.exchangerate.host";

/// Environment variable holding the API access key, if the service needs one
pub const ACCESS_KEY_VAR: &str = "EXCHANGERATE_HOST_ACCESS_KEY";

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
struct RatesResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    rates: HashMap<String, Decimal>,
}

impl From<reqwest::Error> for RateError {
    fn from(err: reqwest::Error) -> Self {
        RateError::Transport(Box::new(err))
    }
}

/// Historical rates from the exchangerate.host API
pub struct ExchangeRateHost {
    client: Client,
    base_url: String,
    access_key: Option<String>,
}

impl ExchangeRateHost {
    /// `attempt_timeout` bounds each HTTP request, not the whole retry loop
    pub fn new(base_url: &str, attempt_timeout: Duration) -> Result<Self, RateError> {
        let client = Client::builder().timeout(attempt_timeout).build()?;
        Ok(Self::with_client(base_url, client))
    }

    fn with_client(base_url: &str, client: Client) -> Self {
        let access_key = std::env::var(ACCESS_KEY_VAR).ok().filter(|k| !k.is_empty());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_key,
        }
    }

    /// Time a lookup may take when every attempt runs into `attempt_timeout`
    pub fn deadline(attempt_timeout: Duration) -> Duration {
        let mut total = attempt_timeout * MAX_ATTEMPTS;
        let mut backoff = INITIAL_BACKOFF;
        for _ in 1..MAX_ATTEMPTS {
            total += backoff;
            backoff *= 2;
        }
        total
    }

    fn url(&self, on: RateDate) -> String {
        format!("{}/{}", self.base_url, on)
    }

    /// Rate between two ISO currencies
    async fn iso_rate(&self, base: &str, symbol: &str, on: RateDate) -> Result<Decimal, RateError> {
        if base == symbol {
            return Ok(Decimal::ONE);
        }

        let mut query = vec![("base", base.to_string()), ("symbols", symbol.to_string())];
        if let Some(key) = &self.access_key {
            query.push(("access_key", key.clone()));
        }

        let response = self.fetch(&self.url(on), &query).await?;
        if response.success == Some(false) {
            let reason = response.error.map(|e| e.to_string()).unwrap_or_default();
            log::warn!("exchangerate.host refused {}/{} on {}: {}", base, symbol, on, reason);
            return Err(RateError::MissingRate);
        }
        response.rates.get(symbol).copied().ok_or(RateError::MissingRate)
    }

    /// GET with retries on transport errors, 429 and 5xx, backing off between attempts
    async fn fetch(&self, url: &str, query: &[(&str, String)]) -> Result<RatesResponse, RateError> {
        let mut attempt = 1;
        let mut backoff = INITIAL_BACKOFF;
        loop {
            let err = match self.client.get(url).query(query).send().await {
                Ok(response) if response.status().is_success() => {
                    return Ok(response.json::<RatesResponse>().await?);
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    let err = RateError::Status {
                        status: status.as_u16(),
                        body,
                    };
                    if status.as_u16() != 429 && !status.is_server_error() {
                        return Err(err);
                    }
                    err
                }
                Err(err) => RateError::from(err),
            };

            if attempt >= MAX_ATTEMPTS {
                return Err(err);
            }
            log::warn!(
                "Rate request to {} failed ({}), retry {}/{} in {:?}",
                url,
                err,
                attempt,
                MAX_ATTEMPTS - 1,
                backoff
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
            backoff *= 2;
        }
    }
}

/// Turn a rate between ISO currencies into one between ledger currencies (e.g. GBP into GBX)
fn scale_rate(iso_rate: Decimal, from: Currency, to: Currency) -> Decimal {
    iso_rate * to.units_per_iso() / from.units_per_iso()
}

#[async_trait]
impl RateProvider for ExchangeRateHost {
    async fn rate(&self, from: Currency, to: Currency, on: RateDate) -> Result<Decimal, RateError> {
        let iso_rate = self.iso_rate(from.iso_code(), to.iso_code(), on).await?;
        Ok(scale_rate(iso_rate, from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CurrencyConverter;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const EUR_RATE: &str = r#"{"success":true,"rates":{"EUR":0.8}}"#;

    /// Serve one canned answer per connection; `None` accepts and never answers
    async fn serve(answers: Vec<Option<(u16, &'static str)>>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            let mut stalled = Vec::new();
            for answer in answers {
                let (mut socket, _) = listener.accept().await.unwrap();
                counter.fetch_add(1, Ordering::SeqCst);
                let mut request = [0u8; 4096];
                let _ = socket.read(&mut request).await;
                match answer {
                    Some((status, body)) => {
                        let response = format!(
                            "HTTP/1.1 {status} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                            body.len()
                        );
                        socket.write_all(response.as_bytes()).await.unwrap();
                        let _ = socket.shutdown().await;
                    }
                    None => stalled.push(socket),
                }
            }
            // keep stalled connections open until the client gives up on them
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(stalled);
        });
        (format!("http://{addr}"), hits)
    }

    fn local_host(url: &str, attempt_timeout: Duration) -> ExchangeRateHost {
        let client = Client::builder()
            .no_proxy()
            .timeout(attempt_timeout)
            .build()
            .unwrap();
        ExchangeRateHost::with_client(url, client)
    }

    #[tokio::test]
    async fn retries_server_errors() {
        let (url, hits) = serve(vec![Some((503, "busy")), Some((200, EUR_RATE))]).await;
        let host = local_host(&url, Duration::from_secs(5));
        let rate = host.rate(Currency::USD, Currency::EUR, RateDate::Latest).await.unwrap();
        assert_eq!(rate, dec!(0.8));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let answers = vec![Some((429, "slow down")); MAX_ATTEMPTS as usize + 1];
        let (url, hits) = serve(answers).await;
        let host = local_host(&url, Duration::from_secs(5));
        let err = host.rate(Currency::USD, Currency::EUR, RateDate::Latest).await.unwrap_err();
        assert!(matches!(err, RateError::Status { status: 429, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), MAX_ATTEMPTS as usize);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let (url, hits) = serve(vec![Some((404, "no such day")), Some((200, EUR_RATE))]).await;
        let host = local_host(&url, Duration::from_secs(5));
        let err = host.rate(Currency::USD, Currency::EUR, RateDate::Latest).await.unwrap_err();
        assert!(matches!(err, RateError::Status { status: 404, ref body } if body == "no such day"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stalled_request_is_retried_within_deadline() {
        let (url, hits) = serve(vec![None, Some((200, EUR_RATE))]).await;
        let attempt_timeout = Duration::from_millis(300);
        let host = local_host(&url, attempt_timeout);
        let converter = CurrencyConverter::with_timeout(
            Box::new(host),
            ExchangeRateHost::deadline(attempt_timeout),
        );
        let amount = converter
            .convert(dec!(10), Currency::USD, Currency::EUR, None)
            .await
            .unwrap();
        assert_eq!(amount, dec!(8.0));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn deadline_covers_every_attempt_and_backoff() {
        let attempt = Duration::from_secs(30);
        assert_eq!(ExchangeRateHost::deadline(attempt), Duration::from_millis(91_500));
        assert!(ExchangeRateHost::deadline(attempt) > attempt * MAX_ATTEMPTS);
    }

    #[test]
    fn pence_rates_scale_from_sterling() {
        // 1 GBP = 1.16 EUR, so 1 GBX = 0.0116 EUR
        assert_eq!(scale_rate(dec!(1.16), Currency::GBX, Currency::EUR), dec!(0.0116));
        assert_eq!(scale_rate(dec!(0.862), Currency::EUR, Currency::GBX), dec!(86.2));
        assert_eq!(scale_rate(dec!(0.85), Currency::USD, Currency::EUR), dec!(0.85));
    }

    #[test]
    fn url_per_day() {
        let host = ExchangeRateHost::new("https://rates.example/", Duration::from_secs(1)).unwrap();
        let day = NaiveDate::from_ymd_opt(2021, 3, 15).unwrap();
        assert_eq!(host.url(RateDate::On(day)), "https://rates.example/2021-03-15");
        assert_eq!(host.url(RateDate::Latest), "https://rates.example/latest");
    }

    #[test]
    fn parses_rates_response() {
        let body = r#"{"success":true,"base":"USD","date":"2021-03-15","rates":{"EUR":0.838}}"#;
        let response: RatesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.rates.get("EUR"), Some(&dec!(0.838)));
        assert_eq!(response.success, Some(true));
    }

    #[tokio::test]
    async fn same_iso_currency_needs_no_request() {
        let host = ExchangeRateHost::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let rate = host.iso_rate("GBP", "GBP", RateDate::Latest).await.unwrap();
        assert_eq!(rate, Decimal::ONE);
    }
}
