pub mod exchangerate_host;
pub mod table;

pub use exchangerate_host::{ExchangeRateHost, DEFAULT_BASE_URL};
pub use table::RateTable;
