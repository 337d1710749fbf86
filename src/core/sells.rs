use super::currency::Currency;
use super::money::round;
use super::transaction::Transaction;
use rust_decimal::Decimal;
use serde::Serialize;

/// Realised profit and loss for one trade currency, in the main currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SellSummary {
    pub profits: Decimal,
    /// Sum of losing results, zero or negative
    pub losses: Decimal,
    pub total: Decimal,
}

/// Aggregate the results of sales priced in `bucket`.
pub fn aggregate_sell_results<'a, I>(sales: I, bucket: Currency) -> SellSummary
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let (profits, losses) = sales
        .into_iter()
        .filter(|s| s.price_per_share_currency == Some(bucket))
        .fold((Decimal::ZERO, Decimal::ZERO), |(profits, losses), s| {
            if s.result > Decimal::ZERO {
                (profits + s.result, losses)
            } else if s.result < Decimal::ZERO {
                (profits, losses + s.result)
            } else {
                (profits, losses)
            }
        });

    SellSummary {
        profits: round(profits),
        losses: round(losses),
        total: round(profits + losses),
    }
}
