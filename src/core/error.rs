use super::convert::RateDate;
use super::currency::Currency;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("malformed row at line {line}: {reason}")]
    MalformedRow { line: u64, reason: String },
    #[error("ledger has no '{column}' column for main currency {currency}")]
    UnsupportedCurrency { currency: Currency, column: String },
    #[error("transaction '{id}' has withholding tax but no time to convert it at")]
    MissingTimestamp { id: String },
    #[error("no {from}/{to} rate available for {date}: {reason}")]
    RateUnavailable {
        from: Currency,
        to: Currency,
        date: RateDate,
        reason: String,
    },
    #[error("failed to read ledger: {0}")]
    Csv(#[from] csv::Error),
}
