mod cmd;
mod core;
mod rates;

use clap::Parser;

/// Prints out your profits and dividends from a Trading212 ledger export
#[derive(Parser, Debug)]
#[command(name = "t212tax", version, about)]
struct Cli {
    #[command(flatten)]
    report: cmd::ReportCommand,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let cli = Cli::parse();
    cli.report.exec().await
}
