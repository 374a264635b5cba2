//! CLI Command Handlers
//!
//! Operator commands over the ledger in `data_dir`. Mutating commands and
//! `run` hold the ledger's writer lock while they execute, and every commit is
//! on disk before the command reports it. `me` and `history` read the last
//! committed snapshot without the lock.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;

use crate::adapters::gasfree::GasFreeClient;
use crate::adapters::memory::MemoryStore;
use crate::adapters::tron::TronGridOracle;
use crate::application::{
    parse_daily_time, AccountSummary, DepositVerifier, DividendDistributor, FeeSponsor, HistoryQuery, Job,
    Ledger, Receipt, Registration, ReinvestRequest, RunOutcome, Schedule, Scheduler, SettlementEngine,
    SwapRequest, WithdrawRequest,
};
use crate::config::{load_config, Config};
use crate::domain::{Lang, Token, Transaction, TxType};
use crate::ports::{SortOrder, UnconfiguredSigner};

/// AltYield - dual-token ALT/ALB ledger
#[derive(Parser, Debug)]
#[command(
    name = "altyield",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Dual-token ALT/ALB ledger engine",
    long_about = "AltYield keeps the ALT/ALB ledger: swaps with lock periods, USDT deposits \
                  verified on Tron, withdrawals, reinvestment, daily dividends and a \
                  five-level referral cascade."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE", default_value = "config/ledger.toml")]
    pub config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run settlement and dividend schedulers until Ctrl+C
    Run,

    /// Run one lock settlement pass
    Settle,

    /// Run one dividend distribution pass
    Distribute,

    /// Register a user and their wallet
    Register(RegisterCmd),

    /// Swap between ALT and ALB
    Swap(SwapCmd),

    /// Verify an on-chain USDT deposit by transaction hash
    Deposit(DepositCmd),

    /// Request an ALT withdrawal to the configured address
    Withdraw(WithdrawCmd),

    /// Move ALT (dividends first) into locked ALB
    Reinvest(ReinvestCmd),

    /// Show the account summary
    Me(MeCmd),

    /// List wallet transactions
    History(HistoryCmd),

    /// Set the withdraw address
    SetWithdrawAddress(SetWithdrawAddressCmd),

    /// Change the interface language
    SetLang(SetLangCmd),

    /// Freeze or unfreeze a user
    Freeze(FreezeCmd),
}

impl Command {
    /// Commands that never commit and so do not take the writer lock
    pub fn is_read_only(&self) -> bool {
        matches!(self, Command::Me(_) | Command::History(_))
    }
}

#[derive(Parser, Debug)]
pub struct RegisterCmd {
    #[arg(value_name = "USER")]
    pub user: String,

    /// Chain address provisioned for this user's deposits
    #[arg(long, value_name = "ADDRESS")]
    pub deposit_address: String,

    /// Key of the inviting user
    #[arg(long, value_name = "USER")]
    pub referrer: Option<String>,

    #[arg(long, value_name = "LANG", default_value = "en")]
    pub lang: Lang,
}

#[derive(Parser, Debug)]
pub struct SwapCmd {
    #[arg(value_name = "USER")]
    pub user: String,

    /// Source token (ALT or ALB)
    #[arg(value_name = "FROM")]
    pub from: Token,

    /// Target token (ALT or ALB)
    #[arg(value_name = "TO")]
    pub to: Token,

    #[arg(value_name = "AMOUNT")]
    pub amount: Decimal,

    /// ALB/ALT rate the caller was quoted
    #[arg(long, value_name = "RATE")]
    pub rate: Decimal,
}

#[derive(Parser, Debug)]
pub struct DepositCmd {
    #[arg(value_name = "USER")]
    pub user: String,

    /// Chain transaction hash
    #[arg(value_name = "HASH")]
    pub hash: String,
}

#[derive(Parser, Debug)]
pub struct WithdrawCmd {
    #[arg(value_name = "USER")]
    pub user: String,

    /// ALT amount
    #[arg(value_name = "AMOUNT")]
    pub amount: Decimal,

    /// ALT/USDT rate the caller was quoted
    #[arg(long, value_name = "RATE")]
    pub rate: Decimal,
}

#[derive(Parser, Debug)]
pub struct ReinvestCmd {
    #[arg(value_name = "USER")]
    pub user: String,

    /// ALT amount
    #[arg(value_name = "AMOUNT")]
    pub amount: Decimal,

    /// ALB/ALT rate the caller was quoted
    #[arg(long, value_name = "RATE")]
    pub rate: Decimal,
}

#[derive(Parser, Debug)]
pub struct MeCmd {
    #[arg(value_name = "USER")]
    pub user: String,

    /// Output format (text, json)
    #[arg(short, long, value_name = "FORMAT", default_value = "text")]
    pub format: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OrderArg {
    Asc,
    Desc,
}

impl From<OrderArg> for SortOrder {
    fn from(order: OrderArg) -> Self {
        match order {
            OrderArg::Asc => SortOrder::Asc,
            OrderArg::Desc => SortOrder::Desc,
        }
    }
}

#[derive(Parser, Debug)]
pub struct HistoryCmd {
    #[arg(value_name = "USER")]
    pub user: String,

    #[arg(long, default_value = "0")]
    pub offset: usize,

    /// Page size (capped at 100)
    #[arg(long, default_value = "10")]
    pub limit: usize,

    #[arg(long, value_enum, default_value = "desc")]
    pub order: OrderArg,

    /// Only this transaction type (DEPOSIT, WITHDRAW, SWAP, REINVEST, DIVIDENDS, BONUS)
    #[arg(long = "type", value_name = "TYPE")]
    pub tx_type: Option<TxType>,
}

#[derive(Parser, Debug)]
pub struct SetWithdrawAddressCmd {
    #[arg(value_name = "USER")]
    pub user: String,

    #[arg(value_name = "ADDRESS")]
    pub address: String,
}

#[derive(Parser, Debug)]
pub struct SetLangCmd {
    #[arg(value_name = "USER")]
    pub user: String,

    #[arg(value_name = "LANG")]
    pub lang: Lang,
}

#[derive(Parser, Debug)]
pub struct FreezeCmd {
    #[arg(value_name = "USER")]
    pub user: String,

    /// Lift the freeze instead
    #[arg(long)]
    pub unfreeze: bool,
}

/// Execute the CLI command
pub async fn execute(app: CliApp) -> Result<()> {
    let config = load_config(&app.config)
        .with_context(|| format!("Failed to load configuration from {}", app.config.display()))?;
    init_logging(app.verbose, app.debug, &config.logging.level)?;

    let access = if app.command.is_read_only() {
        Access::ReadOnly
    } else {
        Access::Write
    };
    let services = Services::open(config, access)?;

    match app.command {
        Command::Run => return run_command(&services).await,
        Command::Settle => settle_command(&services).await?,
        Command::Distribute => distribute_command(&services).await?,
        Command::Register(cmd) => register_command(&services, cmd).await?,
        Command::Swap(cmd) => {
            let receipt = services
                .ledger
                .swap(&cmd.user, SwapRequest { from: cmd.from, to: cmd.to, amount: cmd.amount, alb_alt_rate: cmd.rate })
                .await?;
            print_receipt("Swap", &receipt);
        }
        Command::Deposit(cmd) => deposit_command(&services, cmd).await?,
        Command::Withdraw(cmd) => {
            let receipt = services
                .ledger
                .withdraw(&cmd.user, WithdrawRequest { amount: cmd.amount, alt_usdt_rate: cmd.rate })
                .await?;
            print_receipt("Withdraw", &receipt);
        }
        Command::Reinvest(cmd) => {
            let receipt = services
                .ledger
                .reinvest(&cmd.user, ReinvestRequest { amount: cmd.amount, alb_alt_rate: cmd.rate })
                .await?;
            print_receipt("Reinvest", &receipt);
        }
        Command::Me(cmd) => me_command(&services, cmd).await?,
        Command::History(cmd) => history_command(&services, cmd).await?,
        Command::SetWithdrawAddress(cmd) => {
            let wallet = services.ledger.change_withdraw_address(&cmd.user, &cmd.address).await?;
            println!("Withdraw address: {}", wallet.withdraw_address.unwrap_or_default());
        }
        Command::SetLang(cmd) => {
            let user = services.ledger.change_lang(&cmd.user, cmd.lang).await?;
            println!("Language for {}: {}", user.key, user.lang);
        }
        Command::Freeze(cmd) => {
            let user = services.ledger.set_frozen(&cmd.user, !cmd.unfreeze).await?;
            println!("{} frozen: {}", user.key, user.is_frozen);
        }
    }

    Ok(())
}

/// Initialize logging system; flags win over the configured level
fn init_logging(verbose: bool, debug: bool, configured: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        configured
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Write,
    ReadOnly,
}

/// Store and ledger built from the configuration
struct Services {
    config: Config,
    store: Arc<MemoryStore>,
    ledger: Ledger,
    data_dir: PathBuf,
}

impl Services {
    fn open(config: Config, access: Access) -> Result<Self> {
        let data_dir = config.ledger.data_path();
        let store = match access {
            Access::Write => MemoryStore::open(&data_dir),
            Access::ReadOnly => MemoryStore::open_read_only(&data_dir),
        }
        .with_context(|| format!("Failed to open ledger in {}", data_dir.display()))?;
        let store = Arc::new(store);
        let ledger = Ledger::new(store.clone()).with_referral_link_base(config.ledger.referral_link_base.clone());

        Ok(Self {
            config,
            store,
            ledger,
            data_dir,
        })
    }

    fn deposit_verifier(&self) -> Result<DepositVerifier> {
        let oracle = TronGridOracle::with_config(self.config.chain.oracle_config())
            .context("Failed to create chain oracle")?;
        let verifier = DepositVerifier::new(self.store.clone(), Arc::new(oracle), self.config.chain.deposit_config());

        let relay_section = &self.config.fee_relay;
        let Some(relay_config) = relay_section.client_config(&self.config.chain.usdt_contract) else {
            tracing::warn!("Fee relay credentials not configured - deposits will be credited without a sweep");
            return Ok(verifier);
        };

        let relay = GasFreeClient::with_config(relay_config).context("Failed to create fee relay client")?;
        let sponsor = FeeSponsor::new(Arc::new(relay), Arc::new(UnconfiguredSigner))
            .with_retry(relay_section.retry_policy())
            .with_max_fees(
                u128::from(relay_section.max_fee_activated),
                u128::from(relay_section.max_fee_not_activated),
            );
        Ok(verifier.with_sponsor(sponsor))
    }
}

async fn run_command(services: &Services) -> Result<()> {
    tracing::info!("Starting AltYield ledger schedulers...");
    tracing::info!("Ledger: {}", services.data_dir.display());

    let dividend_time = parse_daily_time(&services.config.schedule.dividend_time_utc)
        .context("Invalid dividend_time_utc")?;
    let interval = services.config.settlement_interval();

    let settlement: Arc<dyn Job> = Arc::new(SettlementEngine::new(services.store.clone()));
    let dividends: Arc<dyn Job> = Arc::new(DividendDistributor::new(services.store.clone()));

    let scheduler = Arc::new(Scheduler::new());

    // Setup Ctrl+C handler
    let stopper = scheduler.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received");
        stopper.stop().await;
    });

    tokio::join!(
        scheduler.run_job(settlement, Schedule::Interval(interval)),
        scheduler.run_job(dividends, Schedule::Daily(dividend_time)),
    );

    tracing::info!("AltYield ledger stopped");
    Ok(())
}

async fn settle_command(services: &Services) -> Result<()> {
    match SettlementEngine::new(services.store.clone()).run().await? {
        RunOutcome::Completed(report) => println!(
            "Settlement: {} settled, {} skipped, {} failed",
            report.settled, report.skipped, report.failed
        ),
        RunOutcome::Skipped => println!("Settlement skipped - a run is already in progress"),
    }
    Ok(())
}

async fn distribute_command(services: &Services) -> Result<()> {
    match DividendDistributor::new(services.store.clone()).run().await? {
        RunOutcome::Completed(report) => {
            println!(
                "Dividends: {} wallets credited, {} bonuses, {} failures",
                report.wallets_credited, report.bonuses_credited, report.failures
            );
            if report.rotated {
                println!("Daily income percent rotated");
            }
        }
        RunOutcome::Skipped => println!("Distribution skipped - a run is already in progress"),
    }
    Ok(())
}

async fn register_command(services: &Services, cmd: RegisterCmd) -> Result<()> {
    let (user, wallet) = services
        .ledger
        .register(Registration {
            user_key: &cmd.user,
            referrer_key: cmd.referrer.as_deref(),
            lang: cmd.lang,
            deposit_address: &cmd.deposit_address,
        })
        .await?;
    println!("Registered {} (user {}, wallet {})", user.key, user.id, wallet.id);
    println!("Deposit address: {}", wallet.deposit_address);
    Ok(())
}

async fn deposit_command(services: &Services, cmd: DepositCmd) -> Result<()> {
    let verifier = services.deposit_verifier()?;
    let receipt = verifier.deposit(&cmd.user, &cmd.hash).await?;

    println!("Deposit verified: {} USDT", receipt.usdt_amount);
    println!("Credited: {} ALT (tx {})", receipt.transaction.to_amount, receipt.transaction.id);
    println!("Sponsored sweep: {}", if receipt.sponsored { "yes" } else { "no" });
    if let Some(bonus) = receipt.bonus {
        println!("Referrer bonus: {} ALT", bonus.to_amount);
    }
    println!("ALT balance: {}", receipt.wallet.alt_balance);
    Ok(())
}

async fn me_command(services: &Services, cmd: MeCmd) -> Result<()> {
    let summary = services.ledger.me(&cmd.user).await?;
    match cmd.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => print_summary(&summary),
    }
    Ok(())
}

async fn history_command(services: &Services, cmd: HistoryCmd) -> Result<()> {
    let rows = services
        .ledger
        .history(
            &cmd.user,
            HistoryQuery {
                offset: cmd.offset,
                limit: cmd.limit,
                order: cmd.order.into(),
                tx_type: cmd.tx_type,
            },
        )
        .await?;

    if rows.is_empty() {
        println!("No transactions");
    }
    for tx in &rows {
        print_transaction(tx);
    }
    Ok(())
}

fn print_receipt(label: &str, receipt: &Receipt) {
    println!("{} recorded (tx {})", label, receipt.transaction.id);
    print_transaction(&receipt.transaction);
    if receipt.is_take_from_dividends() {
        println!("  part of the amount was taken from dividends");
    }
    let wallet = &receipt.wallet;
    println!(
        "  ALT {} (locked {}, dividends {}) | ALB {} (locked {})",
        wallet.alt_balance,
        wallet.locked_alt_balance,
        wallet.alt_dividends,
        wallet.alb_balance,
        wallet.locked_alb_balance
    );
}

fn print_transaction(tx: &Transaction) {
    let from = match (tx.from_token, tx.from_amount) {
        (Some(token), Some(amount)) => format!("{} {} -> ", amount, token),
        _ => String::new(),
    };
    let locked = tx
        .locked_until
        .map(|until| format!(" until {}", until.format("%Y-%m-%d %H:%M")))
        .unwrap_or_default();
    println!(
        "  #{} {} {:?}{} {}{} {} @ {}",
        tx.id,
        tx.tx_type,
        tx.status,
        locked,
        from,
        tx.to_amount,
        tx.to_token,
        tx.created_at.format("%Y-%m-%d %H:%M:%S")
    );
}

fn print_summary(summary: &AccountSummary) {
    let b = &summary.balances;
    println!("User: {} ({})", summary.user.key, summary.user.lang);
    println!("ALT: {} (~{} USDT)", b.alt, b.alt_in_usdt);
    println!("  locked: {}  dividends: {}", b.locked_alt, b.alt_dividends);
    println!("ALB: {}  locked: {}", b.alb, b.locked_alb);
    println!("Deposit address: {}", summary.deposit_address);
    println!(
        "Withdraw address: {}",
        summary.withdraw_address.as_deref().unwrap_or("-")
    );
    println!(
        "Earned: {}% daily, {} ALT all time, {} ALT last 7 days",
        summary.earned.performance, summary.earned.all_time_alt, summary.earned.last_week_alt
    );
    println!(
        "Rates: ALB/ALT {}  ALT/USDT {}",
        summary.rates.alb_alt_rate, summary.rates.alt_usdt_rate
    );

    let referrals = &summary.referrals;
    println!(
        "Referrals: {} ({} active), bonuses {} ALT",
        referrals.count, referrals.active, referrals.total_bonuses
    );
    println!("Link: {}", referrals.link);
    for level in &referrals.levels {
        println!(
            "  L{} {}%: {} users, {} ALT",
            level.level, level.percent, level.count, level.total_bonuses
        );
    }

    if !summary.history.is_empty() {
        println!("Recent:");
        for tx in &summary.history {
            print_transaction(tx);
        }
    }
}
