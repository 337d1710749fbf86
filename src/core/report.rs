use super::convert::CurrencyConverter;
use super::currency::Currency;
use super::dividends::{aggregate_dividends, DividendSummary};
use super::sells::{aggregate_sell_results, SellSummary};
use super::transaction::Transaction;
use super::ReportError;
use futures::future::try_join_all;
use serde::Serialize;

/// Which holdings a bucket covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Scope {
    All,
    Domestic,
    Foreign,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOptions {
    pub main_currency: Currency,
    /// Country code to split domestic holdings out by, if any
    pub domestic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DividendBucket {
    pub scope: Scope,
    pub currency: Currency,
    #[serde(flatten)]
    pub summary: DividendSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SellBucket {
    pub scope: Scope,
    pub currency: Currency,
    #[serde(flatten)]
    pub summary: SellSummary,
}

impl DividendBucket {
    pub fn label(&self) -> String {
        bucket_label(self.scope, self.currency)
    }
}

impl SellBucket {
    pub fn label(&self) -> String {
        bucket_label(self.scope, self.currency)
    }
}

fn bucket_label(scope: Scope, currency: Currency) -> String {
    match scope {
        Scope::All => currency.to_string(),
        Scope::Domestic => format!("Domestic {}", currency),
        Scope::Foreign => format!("Foreign {}", currency),
    }
}

/// Dividend and P/L summary of one ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub main_currency: Currency,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    pub transaction_count: usize,
    pub dividend_count: usize,
    pub sale_count: usize,
    pub dividends: Vec<DividendBucket>,
    pub sales: Vec<SellBucket>,
}

/// Dividends and sales picked out of a ledger
#[derive(Debug, Default)]
pub struct Partition<'a> {
    pub dividends: Vec<&'a Transaction>,
    pub sales: Vec<&'a Transaction>,
}

impl<'a> Partition<'a> {
    /// Everything that is neither a dividend nor a sale is left out
    pub fn of<I>(transactions: I) -> Self
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let mut partition = Partition::default();
        for tx in transactions {
            if tx.action.is_dividend() {
                partition.dividends.push(tx);
            } else if tx.action.is_sale() {
                partition.sales.push(tx);
            }
        }
        partition
    }
}

/// Split into (domestic, foreign) by ISIN prefix; no ISIN counts as foreign
pub fn split_domestic<'a>(
    transactions: &[&'a Transaction],
    country_code: &str,
) -> (Vec<&'a Transaction>, Vec<&'a Transaction>) {
    transactions
        .iter()
        .copied()
        .partition(|tx| tx.is_domestic(country_code))
}

struct Bucket<'a> {
    scope: Scope,
    currency: Currency,
    dividends: Vec<&'a Transaction>,
    sales: Vec<&'a Transaction>,
}

/// Buckets to compute, in report order
fn plan<'a>(partition: &Partition<'a>, options: &ReportOptions) -> Vec<Bucket<'a>> {
    match &options.domestic {
        None => Currency::ALL
            .into_iter()
            .map(|currency| Bucket {
                scope: Scope::All,
                currency,
                dividends: partition.dividends.clone(),
                sales: partition.sales.clone(),
            })
            .collect(),
        Some(country_code) => {
            let (domestic_dividends, foreign_dividends) =
                split_domestic(&partition.dividends, country_code);
            let (domestic_sales, foreign_sales) = split_domestic(&partition.sales, country_code);

            let domestic = Bucket {
                scope: Scope::Domestic,
                currency: options.main_currency,
                dividends: domestic_dividends,
                sales: domestic_sales,
            };
            let foreign = Currency::ALL.into_iter().map(|currency| Bucket {
                scope: Scope::Foreign,
                currency,
                dividends: foreign_dividends.clone(),
                sales: foreign_sales.clone(),
            });
            std::iter::once(domestic).chain(foreign).collect()
        }
    }
}

/// Build the dividend and P/L report for a parsed ledger.
///
/// Bucket aggregations run concurrently; the first failure aborts the report.
pub async fn build_report(
    transactions: &[Transaction],
    options: &ReportOptions,
    converter: &CurrencyConverter,
) -> Result<Report, ReportError> {
    let partition = Partition::of(transactions);
    log::info!(
        "{} dividends and {} sales among {} transactions",
        partition.dividends.len(),
        partition.sales.len(),
        transactions.len()
    );

    let buckets = plan(&partition, options);
    let main_currency = options.main_currency;

    let dividends = try_join_all(buckets.iter().map(|bucket| async move {
        let summary = aggregate_dividends(
            bucket.dividends.iter().copied(),
            main_currency,
            bucket.currency,
            converter,
        )
        .await?;
        Ok::<_, ReportError>(DividendBucket {
            scope: bucket.scope,
            currency: bucket.currency,
            summary,
        })
    }))
    .await?;

    let sales = buckets
        .iter()
        .map(|bucket| SellBucket {
            scope: bucket.scope,
            currency: bucket.currency,
            summary: aggregate_sell_results(bucket.sales.iter().copied(), bucket.currency),
        })
        .collect();

    Ok(Report {
        main_currency,
        country_code: options.domestic.clone(),
        transaction_count: transactions.len(),
        dividend_count: partition.dividends.len(),
        sale_count: partition.sales.len(),
        dividends,
        sales,
    })
}
