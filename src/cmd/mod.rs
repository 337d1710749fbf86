pub mod report;

pub use report::ReportCommand;

use crate::core::{read_csv, Currency, Transaction};
use anyhow::Context;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Read a ledger CSV (or stdin with "-") in the given main currency
pub fn read_ledger(path: &Path, main_currency: Currency) -> anyhow::Result<Vec<Transaction>> {
    if path.as_os_str() == "-" {
        read_from_stdin(main_currency)
    } else {
        log::info!("Reading ledger {}", path.display());
        let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
        let transactions = read_csv(BufReader::new(file), main_currency)?;
        Ok(transactions)
    }
}

fn read_from_stdin(main_currency: Currency) -> anyhow::Result<Vec<Transaction>> {
    let mut buffer = Vec::new();
    io::stdin().lock().read_to_end(&mut buffer)?;

    if buffer.is_empty() {
        anyhow::bail!("No input received. Provide a file or pipe data to stdin.");
    }

    let transactions = read_csv(io::Cursor::new(buffer), main_currency)?;
    Ok(transactions)
}
