use super::currency::{Currency, CurrencyColumns};
use super::ReportError;
use chrono::{DateTime, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::str::FromStr;

/// Placeholder the ledger export writes into numeric cells it has no value for
const NOT_AVAILABLE: &str = "Not available";

const ACTION: &str = "Action";
const TIME: &str = "Time";
const ISIN: &str = "ISIN";
const TICKER: &str = "Ticker";
const NAME: &str = "Name";
const SHARES: &str = "No. of shares";
const PRICE_PER_SHARE: &str = "Price / share";
const PRICE_PER_SHARE_CURRENCY: &str = "Currency (Price / share)";
const EXCHANGE_RATE: &str = "Exchange rate";
const WITHHOLDING_TAX: &str = "Withholding tax";
const WITHHOLDING_TAX_CURRENCY: &str = "Currency (Withholding tax)";
const NOTES: &str = "Notes";
const ID: &str = "ID";

/// One ledger row keyed by column header
pub type RawRow = HashMap<String, String>;

/// Kind of ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Action {
    #[default]
    Deposit,
    Withdrawal,
    MarketBuy,
    MarketSell,
    StopSell,
    DividendOrdinary,
    DividendReturnOfCapital,
    /// Any other entry kind the export writes, e.g. "Interest on cash"
    Other(String),
}

impl Action {
    pub fn is_dividend(&self) -> bool {
        matches!(self, Action::DividendOrdinary | Action::DividendReturnOfCapital)
    }

    pub fn is_sale(&self) -> bool {
        matches!(self, Action::MarketSell | Action::StopSell)
    }

    /// Spelling used in the ledger's `Action` column
    pub fn label(&self) -> &str {
        match self {
            Action::Deposit => "Deposit",
            Action::Withdrawal => "Withdrawal",
            Action::MarketBuy => "Market buy",
            Action::MarketSell => "Market sell",
            Action::StopSell => "Stop sell",
            Action::DividendOrdinary => "Dividend (Ordinary)",
            Action::DividendReturnOfCapital => "Dividend (Return of capital)",
            Action::Other(label) => label,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Deposit" => Ok(Action::Deposit),
            "Withdrawal" => Ok(Action::Withdrawal),
            "Market buy" => Ok(Action::MarketBuy),
            "Market sell" => Ok(Action::MarketSell),
            "Stop sell" => Ok(Action::StopSell),
            "Dividend (Ordinary)" => Ok(Action::DividendOrdinary),
            "Dividend (Return of capital)" => Ok(Action::DividendReturnOfCapital),
            "" => Err("missing Action".to_string()),
            other => Ok(Action::Other(other.to_string())),
        }
    }
}

/// A normalized ledger entry.
///
/// `result`, `total` and the charge fields are expressed in the main currency
/// chosen when the ledger was read.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Transaction {
    pub action: Action,
    pub time: Option<NaiveDateTime>,
    pub isin: Option<String>,
    pub ticker: Option<String>,
    pub name: Option<String>,
    pub shares: Decimal,
    pub price_per_share: Decimal,
    pub price_per_share_currency: Option<Currency>,
    pub exchange_rate: Decimal,
    pub result: Decimal,
    pub total: Decimal,
    pub withholding_tax: Decimal,
    pub withholding_tax_currency: Option<Currency>,
    pub charge_amount: Decimal,
    pub stamp_duty_reserve_tax: Decimal,
    pub transaction_fee: Decimal,
    pub finra_fee: Decimal,
    pub notes: String,
    pub id: String,
}

impl Transaction {
    /// Normalize one raw row, reading main-currency amounts from `columns`.
    ///
    /// `line` is only used to locate the row in error messages.
    pub fn from_row(row: &RawRow, columns: &CurrencyColumns, line: u64) -> Result<Self, ReportError> {
        let action = match row.get(ACTION).map(|a| a.trim()) {
            None | Some("") => {
                return Err(ReportError::MalformedRow {
                    line,
                    reason: "missing Action".to_string(),
                })
            }
            Some(action) => action
                .parse::<Action>()
                .map_err(|reason| ReportError::MalformedRow { line, reason })?,
        };
        if let Action::Other(label) = &action {
            log::debug!("Line {}: keeping '{}' row outside dividends and sales", line, label);
        }

        let number = |column: &str| row.get(column).map_or(Decimal::ZERO, |v| parse_number(v));
        let text = |column: &str| row.get(column).cloned().unwrap_or_default();

        Ok(Transaction {
            action,
            time: parse_time(row.get(TIME).map(String::as_str))
                .map_err(|reason| ReportError::MalformedRow { line, reason })?,
            isin: non_empty(row.get(ISIN)),
            ticker: non_empty(row.get(TICKER)),
            name: non_empty(row.get(NAME)),
            shares: number(SHARES),
            price_per_share: number(PRICE_PER_SHARE),
            price_per_share_currency: parse_currency(row.get(PRICE_PER_SHARE_CURRENCY), line),
            exchange_rate: number(EXCHANGE_RATE),
            result: number(columns.result),
            total: number(columns.total),
            withholding_tax: number(WITHHOLDING_TAX),
            withholding_tax_currency: parse_currency(row.get(WITHHOLDING_TAX_CURRENCY), line),
            charge_amount: number(columns.charge_amount),
            stamp_duty_reserve_tax: number(columns.stamp_duty_reserve_tax),
            transaction_fee: number(columns.transaction_fee),
            finra_fee: number(columns.finra_fee),
            notes: text(NOTES),
            id: text(ID),
        })
    }

    pub fn is_domestic(&self, country_code: &str) -> bool {
        self.isin
            .as_deref()
            .is_some_and(|isin| isin.starts_with(country_code))
    }
}

/// Parse a numeric cell; empty, "Not available" and unparseable values are 0
pub fn parse_number(input: &str) -> Decimal {
    let input = input.trim();
    if input.is_empty() || input == NOT_AVAILABLE {
        return Decimal::ZERO;
    }
    // rust_decimal reads "1_000" as 1000; the export never writes digit separators
    if input.contains('_') {
        log::debug!("Treating unparseable number '{}' as 0", input);
        return Decimal::ZERO;
    }
    Decimal::from_str(input)
        .or_else(|_| Decimal::from_scientific(input))
        .unwrap_or_else(|_| {
            log::debug!("Treating unparseable number '{}' as 0", input);
            Decimal::ZERO
        })
}

/// Parse a `Time` cell; absent or empty means no timestamp
pub fn parse_time(input: Option<&str>) -> Result<Option<NaiveDateTime>, String> {
    let s = match input.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(s) => s,
    };
    for format in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(Some(dt));
        }
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| Some(dt.naive_utc()))
        .map_err(|_| format!("invalid time '{s}'"))
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).cloned()
}

fn parse_currency(value: Option<&String>, line: u64) -> Option<Currency> {
    let value = value.map(|v| v.trim()).filter(|v| !v.is_empty())?;
    match value.parse::<Currency>() {
        Ok(currency) => Some(currency),
        Err(err) => {
            log::debug!("Line {}: {}, row excluded from currency buckets", line, err);
            None
        }
    }
}

/// Read a ledger CSV, taking main-currency amounts from `main_currency`'s columns
pub fn read_csv<R: Read>(reader: R, main_currency: Currency) -> Result<Vec<Transaction>, ReportError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let columns = main_currency.columns();
    columns.validate(headers.iter().map(String::as_str))?;
    if !headers.iter().any(|h| h == ACTION) {
        return Err(ReportError::MalformedRow {
            line: 1,
            reason: "header has no Action column".to_string(),
        });
    }

    let mut transactions = Vec::new();
    for (index, record) in rdr.records().enumerate() {
        let record = record?;
        let line = record
            .position()
            .map_or(index as u64 + 2, |position| position.line());
        let row: RawRow = headers
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();
        transactions.push(Transaction::from_row(&row, &columns, line)?);
    }

    log::info!("Parsed {} ledger rows", transactions.len());
    Ok(transactions)
}
