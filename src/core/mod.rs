pub mod convert;
pub mod currency;
pub mod dividends;
pub mod error;
pub mod money;
pub mod report;
pub mod sells;
pub mod transaction;

// Flat public surface for domain types and functions.
#[allow(unused_imports)]
pub use convert::{
    CurrencyConverter, RateDate, RateError, RateProvider, DEFAULT_RATE_TIMEOUT, MAX_CONCURRENT_LOOKUPS,
};
#[allow(unused_imports)]
pub use currency::{Currency, CurrencyColumns};
#[allow(unused_imports)]
pub use dividends::{aggregate_dividends, DividendSummary};
pub use error::ReportError;
#[allow(unused_imports)]
pub use report::{build_report, split_domestic, DividendBucket, Partition, Report, ReportOptions, Scope, SellBucket};
#[allow(unused_imports)]
pub use sells::{aggregate_sell_results, SellSummary};
#[allow(unused_imports)]
pub use transaction::{parse_number, parse_time, read_csv, Action, RawRow, Transaction};
