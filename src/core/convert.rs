use super::currency::Currency;
use super::ReportError;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::fmt;
use std::time::Duration;
use tokio::sync::Semaphore;

pub const DEFAULT_RATE_TIMEOUT: Duration = Duration::from_secs(30);

/// Rate lookups allowed in flight at once
pub const MAX_CONCURRENT_LOOKUPS: usize = 8;

/// Day an exchange rate is requested for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateDate {
    Latest,
    On(NaiveDate),
}

impl From<Option<NaiveDateTime>> for RateDate {
    fn from(as_of: Option<NaiveDateTime>) -> Self {
        as_of.map_or(RateDate::Latest, |dt| RateDate::On(dt.date()))
    }
}

impl fmt::Display for RateDate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RateDate::Latest => f.write_str("latest"),
            RateDate::On(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RateError {
    #[error("request failed: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("rate service answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("no rate published")]
    MissingRate,
    #[error("lookup timed out after {0:?}")]
    Timeout(Duration),
}

/// Source of exchange rates: how many `to` one `from` buys on a given day
#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn rate(&self, from: Currency, to: Currency, on: RateDate) -> Result<Decimal, RateError>;
}

/// Converts amounts between currencies at historical rates
pub struct CurrencyConverter {
    provider: Box<dyn RateProvider>,
    timeout: Duration,
    lookups: Semaphore,
}

impl CurrencyConverter {
    pub fn new(provider: Box<dyn RateProvider>) -> Self {
        Self::with_timeout(provider, DEFAULT_RATE_TIMEOUT)
    }

    /// `timeout` bounds each lookup once it holds one of the lookup slots
    pub fn with_timeout(provider: Box<dyn RateProvider>, timeout: Duration) -> Self {
        Self {
            provider,
            timeout,
            lookups: Semaphore::new(MAX_CONCURRENT_LOOKUPS),
        }
    }

    /// Express `amount` of `from` in `to`, at the rate for `as_of`'s day (or the latest rate).
    ///
    /// Same-currency conversions never reach the provider.
    pub async fn convert(
        &self,
        amount: Decimal,
        from: Currency,
        to: Currency,
        as_of: Option<NaiveDateTime>,
    ) -> Result<Decimal, ReportError> {
        if from == to {
            return Ok(amount);
        }

        let date = RateDate::from(as_of);
        let unavailable = |reason: String| ReportError::RateUnavailable {
            from,
            to,
            date,
            reason,
        };

        let _permit = self
            .lookups
            .acquire()
            .await
            .map_err(|err| unavailable(err.to_string()))?;
        let lookup = self.provider.rate(from, to, date);
        let rate = match tokio::time::timeout(self.timeout, lookup).await {
            Ok(rate) => rate,
            Err(_) => Err(RateError::Timeout(self.timeout)),
        }
        .map_err(|err| unavailable(err.to_string()))?;

        log::debug!("{} {}/{} rate: {}", date, from, to, rate);
        Ok(rate * amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingProvider {
        calls: Arc<AtomicUsize>,
        result: Option<Decimal>,
    }

    #[async_trait]
    impl RateProvider for CountingProvider {
        async fn rate(&self, _: Currency, _: Currency, _: RateDate) -> Result<Decimal, RateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.ok_or(RateError::MissingRate)
        }
    }

    struct SlowProvider;

    struct GaugeProvider {
        in_flight: AtomicUsize,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RateProvider for GaugeProvider {
        async fn rate(&self, _: Currency, _: Currency, _: RateDate) -> Result<Decimal, RateError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(dec!(0.5))
        }
    }

    #[async_trait]
    impl RateProvider for SlowProvider {
        async fn rate(&self, _: Currency, _: Currency, _: RateDate) -> Result<Decimal, RateError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Decimal::ONE)
        }
    }

    fn counting(result: Option<Decimal>) -> (CurrencyConverter, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = CountingProvider {
            calls: calls.clone(),
            result,
        };
        (CurrencyConverter::new(Box::new(provider)), calls)
    }

    fn at(date: &str) -> Option<NaiveDateTime> {
        Some(
            NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn same_currency_skips_provider() {
        let (converter, calls) = counting(None);
        for currency in Currency::ALL {
            let amount = converter
                .convert(dec!(12.34), currency, currency, at("2021-01-01"))
                .await
                .unwrap();
            assert_eq!(amount, dec!(12.34));
            let amount = converter.convert(dec!(5), currency, currency, None).await.unwrap();
            assert_eq!(amount, dec!(5));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn multiplies_by_rate() {
        let (converter, calls) = counting(Some(dec!(0.85)));
        let amount = converter
            .convert(dec!(10), Currency::USD, Currency::EUR, at("2021-06-30"))
            .await
            .unwrap();
        assert_eq!(amount, dec!(8.50));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn provider_failure_is_rate_unavailable() {
        let (converter, _) = counting(None);
        let err = converter
            .convert(dec!(10), Currency::USD, Currency::EUR, at("2021-06-30"))
            .await
            .unwrap_err();
        let expected_date = RateDate::On(NaiveDate::from_ymd_opt(2021, 6, 30).unwrap());
        assert!(matches!(
            err,
            ReportError::RateUnavailable { from: Currency::USD, to: Currency::EUR, date, .. }
                if date == expected_date
        ));
    }

    #[tokio::test]
    async fn slow_lookup_times_out() {
        let converter = CurrencyConverter::with_timeout(Box::new(SlowProvider), Duration::from_millis(20));
        let err = converter
            .convert(dec!(1), Currency::GBX, Currency::EUR, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::RateUnavailable { date: RateDate::Latest, .. }));
    }

    #[tokio::test]
    async fn concurrent_lookups_are_bounded() {
        let peak = Arc::new(AtomicUsize::new(0));
        let provider = GaugeProvider {
            in_flight: AtomicUsize::new(0),
            peak: peak.clone(),
        };
        let converter = CurrencyConverter::new(Box::new(provider));

        let count = MAX_CONCURRENT_LOOKUPS * 4;
        let lookups = (0..count).map(|_| converter.convert(dec!(2), Currency::USD, Currency::EUR, None));
        let amounts = futures::future::try_join_all(lookups).await.unwrap();

        assert_eq!(amounts.len(), count);
        assert!(amounts.iter().all(|a| *a == dec!(1.0)));
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= MAX_CONCURRENT_LOOKUPS, "peak {peak}");
        assert!(peak > 1, "lookups never overlapped");
    }

    #[test]
    fn rate_date_from_timestamp() {
        assert_eq!(RateDate::from(None), RateDate::Latest);
        assert_eq!(RateDate::from(at("2020-02-29")).to_string(), "2020-02-29");
        assert_eq!(RateDate::Latest.to_string(), "latest");
    }
}
