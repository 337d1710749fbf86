//! Report command - dividends and realised P/L per currency

use super::read_ledger;
use crate::core::{
    build_report, Currency, CurrencyConverter, DividendBucket, Report, ReportOptions,
    SellBucket, DEFAULT_RATE_TIMEOUT,
};
use crate::rates::{ExchangeRateHost, RateTable, DEFAULT_BASE_URL};
use anyhow::Context;
use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct ReportCommand {
    /// The path to the CSV that you downloaded from Trading212 ("-" for stdin)
    path: PathBuf,

    /// The currency of your Trading212 account
    #[arg(short, long, value_enum, ignore_case = true, default_value_t = CurrencyArg::Eur)]
    currency: CurrencyArg,

    /// The country code (e.g. DE, UK) of the country you are in, used with --domestic
    #[arg(long, default_value = "DE")]
    country_code: String,

    /// Show domestic profits and dividends separately
    #[arg(short, long)]
    domestic: bool,

    /// CSV file of exchange rates (date,from,to,rate) to use instead of the rate service
    #[arg(long, value_name = "FILE")]
    rates: Option<PathBuf>,

    /// Base URL of the exchangerate.host compatible rate service
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    rates_url: String,

    /// Seconds to wait for each exchange rate request (retries get their own)
    #[arg(long, default_value_t = DEFAULT_RATE_TIMEOUT.as_secs())]
    rate_timeout: u64,

    /// Output as JSON instead of formatted tables
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum CurrencyArg {
    #[default]
    #[value(name = "EUR")]
    Eur,
    #[value(name = "USD")]
    Usd,
    #[value(name = "GBX")]
    Gbx,
}

impl From<CurrencyArg> for Currency {
    fn from(arg: CurrencyArg) -> Self {
        match arg {
            CurrencyArg::Eur => Currency::EUR,
            CurrencyArg::Usd => Currency::USD,
            CurrencyArg::Gbx => Currency::GBX,
        }
    }
}

impl ReportCommand {
    pub async fn exec(&self) -> anyhow::Result<()> {
        let main_currency: Currency = self.currency.into();
        let country_code = self.country_code.trim();
        if self.domestic && country_code.is_empty() {
            anyhow::bail!("--country-code must not be empty when using --domestic");
        }

        let transactions = read_ledger(&self.path, main_currency)?;
        let options = ReportOptions {
            main_currency,
            domestic: self.domestic.then(|| country_code.to_string()),
        };

        let converter = self.converter()?;
        let report = build_report(&transactions, &options, &converter)
            .await
            .context("failed to build report")?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }
        Ok(())
    }

    fn converter(&self) -> anyhow::Result<CurrencyConverter> {
        let timeout = Duration::from_secs(self.rate_timeout);
        match &self.rates {
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("cannot open rates file {}", path.display()))?;
                let table = RateTable::read_csv(BufReader::new(file))?;
                Ok(CurrencyConverter::with_timeout(Box::new(table), timeout))
            }
            None => {
                let host = ExchangeRateHost::new(&self.rates_url, timeout)?;
                let deadline = ExchangeRateHost::deadline(timeout);
                Ok(CurrencyConverter::with_timeout(Box::new(host), deadline))
            }
        }
    }
}

#[derive(Debug, Tabled)]
struct DividendRow {
    #[tabled(rename = "Dividends")]
    label: String,
    #[tabled(rename = "Net")]
    net_total: String,
    #[tabled(rename = "Tax")]
    tax: String,
    #[tabled(rename = "Total")]
    total: String,
}

#[derive(Debug, Tabled)]
struct SellRow {
    #[tabled(rename = "P/L")]
    label: String,
    #[tabled(rename = "Profits")]
    profits: String,
    #[tabled(rename = "Losses")]
    losses: String,
    #[tabled(rename = "Total")]
    total: String,
}

fn print_report(report: &Report) {
    let currency = report.main_currency;
    let dividends: Vec<DividendRow> = report
        .dividends
        .iter()
        .map(|b: &DividendBucket| DividendRow {
            label: b.label(),
            net_total: format_amount(b.summary.net_total, currency),
            tax: format_amount(b.summary.tax, currency),
            total: format_amount(b.summary.total, currency),
        })
        .collect();
    let sales: Vec<SellRow> = report
        .sales
        .iter()
        .map(|b: &SellBucket| SellRow {
            label: b.label(),
            profits: format_amount(b.summary.profits, currency),
            losses: format_amount(b.summary.losses, currency),
            total: format_amount(b.summary.total, currency),
        })
        .collect();

    println!();
    println!(
        "DIVIDENDS ({} of {} transactions)",
        report.dividend_count, report.transaction_count
    );
    println!("{}", table(&dividends));
    println!();
    println!(
        "PROFIT / LOSS ({} of {} transactions)",
        report.sale_count, report.transaction_count
    );
    println!("{}", table(&sales));
    println!();
}

fn table<T: Tabled>(rows: &[T]) -> String {
    Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string()
}

fn format_amount(amount: Decimal, currency: Currency) -> String {
    format!("{:.2} {}", amount, currency)
}
