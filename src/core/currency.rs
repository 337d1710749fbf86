use super::ReportError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Currencies the ledger can be reported in, in report order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Currency {
    EUR,
    USD,
    /// Pence sterling
    GBX,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::EUR, Currency::USD, Currency::GBX];

    pub fn code(self) -> &'static str {
        match self {
            Currency::EUR => "EUR",
            Currency::USD => "USD",
            Currency::GBX => "GBX",
        }
    }

    /// ISO 4217 code that rate services quote this currency under
    pub fn iso_code(self) -> &'static str {
        match self {
            Currency::GBX => "GBP",
            other => other.code(),
        }
    }

    /// Number of units of this currency per unit of its ISO currency
    pub fn units_per_iso(self) -> Decimal {
        match self {
            Currency::GBX => dec!(100),
            _ => Decimal::ONE,
        }
    }

    /// Source column names holding amounts expressed in this currency
    pub fn columns(self) -> CurrencyColumns {
        match self {
            Currency::EUR => CurrencyColumns {
                currency: Currency::EUR,
                result: "Result (EUR)",
                total: "Total (EUR)",
                charge_amount: "Charge amount (EUR)",
                stamp_duty_reserve_tax: "Stamp duty reserve tax (EUR)",
                transaction_fee: "Transaction fee (EUR)",
                finra_fee: "Finra fee (EUR)",
            },
            Currency::USD => CurrencyColumns {
                currency: Currency::USD,
                result: "Result (USD)",
                total: "Total (USD)",
                charge_amount: "Charge amount (USD)",
                stamp_duty_reserve_tax: "Stamp duty reserve tax (USD)",
                transaction_fee: "Transaction fee (USD)",
                finra_fee: "Finra fee (USD)",
            },
            Currency::GBX => CurrencyColumns {
                currency: Currency::GBX,
                result: "Result (GBX)",
                total: "Total (GBX)",
                charge_amount: "Charge amount (GBX)",
                stamp_duty_reserve_tax: "Stamp duty reserve tax (GBX)",
                transaction_fee: "Transaction fee (GBX)",
                finra_fee: "Finra fee (GBX)",
            },
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown currency code: {0}")]
pub struct UnknownCurrency(pub String);

impl FromStr for Currency {
    type Err = UnknownCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "EUR" => Ok(Currency::EUR),
            "USD" => Ok(Currency::USD),
            "GBX" => Ok(Currency::GBX),
            other => Err(UnknownCurrency(other.to_string())),
        }
    }
}

/// Names of the currency-suffixed ledger columns for one main currency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrencyColumns {
    pub currency: Currency,
    pub result: &'static str,
    pub total: &'static str,
    pub charge_amount: &'static str,
    pub stamp_duty_reserve_tax: &'static str,
    pub transaction_fee: &'static str,
    pub finra_fee: &'static str,
}

impl CurrencyColumns {
    /// Check that a ledger header row carries the columns every report needs.
    ///
    /// Charge and fee columns are only exported when the account incurred them,
    /// so their absence is not an error.
    pub fn validate<'a, I>(&self, headers: I) -> Result<(), ReportError>
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        for required in [self.result, self.total] {
            if !headers.clone().into_iter().any(|h| h.trim() == required) {
                return Err(ReportError::UnsupportedCurrency {
                    currency: self.currency,
                    column: required.to_string(),
                });
            }
        }
        Ok(())
    }
}
