use crate::core::{Currency, RateDate, RateError, RateProvider};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;

#[derive(Debug, Deserialize)]
struct Record {
    date: NaiveDate,
    from: String,
    to: String,
    rate: Decimal,
}

#[derive(Debug, thiserror::Error)]
pub enum RateFileError {
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("line {line}: {reason}")]
    InvalidRecord { line: u64, reason: String },
}

/// Daily rates held in memory, e.g. loaded from a rates file for offline runs
#[derive(Debug, Default)]
pub struct RateTable {
    rates: HashMap<(Currency, Currency), BTreeMap<NaiveDate, Decimal>>,
}

impl RateTable {
    pub fn insert(&mut self, from: Currency, to: Currency, date: NaiveDate, rate: Decimal) {
        self.rates.entry((from, to)).or_default().insert(date, rate);
    }

    /// Read `date,from,to,rate` records, one rate per pair and day
    pub fn read_csv<R: Read>(reader: R) -> Result<RateTable, RateFileError> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut table = RateTable::default();
        for (index, result) in rdr.deserialize::<Record>().enumerate() {
            let record = result?;
            let line = index as u64 + 2;
            let invalid = |reason: String| RateFileError::InvalidRecord { line, reason };
            let from = record.from.parse::<Currency>().map_err(|e| invalid(format!("{e}")))?;
            let to = record.to.parse::<Currency>().map_err(|e| invalid(format!("{e}")))?;
            if record.rate <= Decimal::ZERO {
                return Err(invalid(format!("rate must be positive, got {}", record.rate)));
            }
            table.insert(from, to, record.date, record.rate);
        }
        if table.is_empty() {
            log::warn!("Rates file holds no rates, every foreign conversion will fail");
        } else {
            log::info!("Loaded {} exchange rates", table.len());
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.rates.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.values().all(BTreeMap::is_empty)
    }

    fn direct(&self, from: Currency, to: Currency, on: RateDate) -> Option<Decimal> {
        let days = self.rates.get(&(from, to))?;
        match on {
            RateDate::On(date) => days.get(&date).copied(),
            RateDate::Latest => days.values().next_back().copied(),
        }
    }

    /// Rate for the pair on the day, falling back to the inverse of the opposite pair
    pub fn get(&self, from: Currency, to: Currency, on: RateDate) -> Option<Decimal> {
        self.direct(from, to, on)
            .or_else(|| self.direct(to, from, on).map(|inverse| Decimal::ONE / inverse))
    }
}

#[async_trait]
impl RateProvider for RateTable {
    async fn rate(&self, from: Currency, to: Currency, on: RateDate) -> Result<Decimal, RateError> {
        self.get(from, to, on).ok_or(RateError::MissingRate)
    }
}
