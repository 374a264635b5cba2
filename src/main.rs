//! AltYield - dual-token ALT/ALB ledger
//!
//! Operator binary: runs the settlement and dividend schedulers and exposes
//! the request-driven ledger operations as commands.

use anyhow::Result;

use altyield::adapters::cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (secrets go here, not in the config file)
    dotenvy::dotenv().ok();

    let app = cli::init();
    cli::execute(app).await
}
