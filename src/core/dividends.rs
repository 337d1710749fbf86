use super::convert::CurrencyConverter;
use super::currency::Currency;
use super::money::round;
use super::transaction::Transaction;
use super::ReportError;
use futures::future::try_join_all;
use rust_decimal::Decimal;
use serde::Serialize;

/// Dividend totals for one withholding-tax currency, in the main currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DividendSummary {
    /// Dividends received after withholding tax
    pub net_total: Decimal,
    /// Withholding tax, converted at each payment's own date
    pub tax: Decimal,
    /// Gross dividends, `net_total + tax` of the rounded parts
    pub total: Decimal,
}

/// Aggregate the dividends whose withholding tax was charged in `bucket`.
pub async fn aggregate_dividends<'a, I>(
    dividends: I,
    main_currency: Currency,
    bucket: Currency,
    converter: &CurrencyConverter,
) -> Result<DividendSummary, ReportError>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let in_bucket: Vec<&Transaction> = dividends
        .into_iter()
        .filter(|d| d.withholding_tax_currency == Some(bucket))
        .collect();

    let net_total: Decimal = in_bucket.iter().map(|d| d.total).sum();

    let taxed: Vec<&Transaction> = in_bucket
        .into_iter()
        .filter(|d| d.withholding_tax > Decimal::ZERO)
        .collect();
    if let Some(undated) = taxed.iter().find(|d| d.time.is_none()) {
        return Err(ReportError::MissingTimestamp {
            id: undated.id.clone(),
        });
    }

    let conversions = taxed.iter().map(|d| {
        converter.convert(d.withholding_tax, bucket, main_currency, d.time)
    });
    let tax: Decimal = try_join_all(conversions).await?.into_iter().sum();

    log::debug!(
        "{} dividends: net {}, tax {} ({} taxed payments)",
        bucket,
        net_total,
        tax,
        taxed.len()
    );

    let net_total = round(net_total);
    let tax = round(tax);
    Ok(DividendSummary {
        net_total,
        tax,
        total: round(net_total + tax),
    })
}
