// OTC desk client for the escrow-backed token desk on BNB Smart Chain
// Runs the terminal UI by default, or a single action from the command line

use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use otc_desk::{
    config::Config,
    storage,
    types::{format_amount, short_address, PaymentMethod},
    ui,
    wallet::{RpcWallet, UnavailableWallet, WalletProvider},
    Action, OtcDesk,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive terminal UI (default)
    Tui,
    /// Connected account, network, balances and saved rates
    Status,
    /// List escrow trades
    Trades,
    /// Approve the escrow (token) or the receiver (stable) to spend your tokens
    Approve {
        #[arg(value_enum)]
        asset: ApproveTarget,
    },
    /// Lock tokens in escrow for a buyer
    CreateTrade { buyer: String, amount: String },
    /// Release an open trade to its buyer
    Release { id: u64 },
    /// Cancel an open trade and return the tokens to the seller
    Cancel { id: u64 },
    /// Settle a disputed trade in favour of a recipient (owner only)
    Resolve { id: u64, recipient: String },
    /// Pay for tokens with the native coin, the stablecoin or off-platform
    Buy {
        method: PaymentMethod,
        amount: String,
        /// How you will pay, for off-platform purchases
        #[arg(long, default_value = "")]
        info: String,
    },
    /// Send tokens directly, bypassing escrow (owner only)
    Transfer { to: String, amount: String },
    /// Save the advisory exchange rates (owner only)
    SetRates { native: String, stable: String },
    /// Ask the wallet to switch to BNB Smart Chain
    SwitchNetwork,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ApproveTarget {
    Token,
    Stable,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Tui);
    let tui_enabled = matches!(command, Command::Tui);

    std::fs::create_dir_all(&cli.config.log_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&cli.config.log_dir, "otc-desk.log");
    let (non_blocking_file, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if tui_enabled {
        // In TUI mode, write logs to the file and the activity pane
        let (log_tx, log_rx) = mpsc::channel::<String>(1024);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(ui::LogForwarderLayer::new(log_tx))
            .with(fmt::layer().with_writer(non_blocking_file).with_ansi(false))
            .init();

        let desk = build_desk(cli.config, true).await?;
        run_tui(desk, log_rx).await
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(fmt::layer().with_writer(non_blocking_file).with_ansi(false))
            .init();

        let desk = build_desk(cli.config, false).await?;
        run_command(desk, command).await
    }
}

async fn build_desk(config: Config, tolerate_missing_wallet: bool) -> anyhow::Result<Arc<OtcDesk>> {
    info!("Starting OTC desk client");

    let wallet: Arc<dyn WalletProvider> = match RpcWallet::connect(
        &config.wallet_url,
        config.receipt_poll_interval(),
        config.receipt_timeout(),
    )
    .await
    {
        Ok(wallet) => Arc::new(wallet),
        Err(e) if tolerate_missing_wallet => {
            warn!("{}", e);
            Arc::new(UnavailableWallet::new(e.to_string()))
        }
        Err(e) => return Err(e).context("Cannot reach the wallet endpoint"),
    };

    let rates = storage::create_rate_store(&config.rates_path).await;
    OtcDesk::new(config, wallet, rates).await
}

async fn run_tui(desk: Arc<OtcDesk>, log_rx: mpsc::Receiver<String>) -> anyhow::Result<()> {
    let pump = desk.spawn_event_pump();

    let connecting = Arc::clone(&desk);
    tokio::spawn(async move {
        let _ = connecting.connect().await;
    });

    let result = ui::run_dashboard(desk, log_rx).await;
    pump.abort();
    result
}

async fn run_command(desk: Arc<OtcDesk>, command: Command) -> anyhow::Result<()> {
    if let Command::SwitchNetwork = command {
        let chain_id = desk.switch_network().await?;
        println!("Wallet is on chain {}", chain_id);
        return Ok(());
    }

    desk.connect().await?;
    let snapshot = desk.snapshot();
    let config = desk.config();

    let action = match command {
        Command::Tui | Command::SwitchNetwork => return Ok(()),
        Command::Status => {
            let session = &snapshot.session;
            let account = session.account.as_ref().map(short_address).unwrap_or_default();
            println!("Account:  {}", account);
            println!(
                "Chain:    {} ({})",
                session.chain_id.unwrap_or_default(),
                if session.network_supported(&config.accepted_chains) { "supported" } else { "unsupported" }
            );
            println!("Role:     {:?}", session.role(config.receiver_address));
            let b = &session.balances;
            println!("{:<9} {}", format!("{}:", config.token_symbol), format_amount(b.token));
            println!("{:<9} {}", format!("{}:", config.native_symbol), format_amount(b.native));
            println!("{:<9} {}", format!("{}:", config.stable_symbol), format_amount(b.stable));
            println!("Escrow allowance:   {}", format_amount(b.token_allowance));
            println!("Receiver allowance: {}", format_amount(b.stable_allowance));
            println!(
                "Rates:    {} {} / {} {} per {}",
                format_amount(snapshot.rates.native),
                config.native_symbol,
                format_amount(snapshot.rates.stable),
                config.stable_symbol,
                config.token_symbol
            );
            return Ok(());
        }
        Command::Trades => {
            let trades = desk.trades()?;
            if let Some(e) = &snapshot.ledger_error {
                return Err(anyhow!("Failed to load trades: {}", e));
            }
            for trade in &trades {
                println!(
                    "#{:<4} {:<14} -> {:<14} {:>20} {}",
                    trade.id,
                    short_address(&trade.seller),
                    short_address(&trade.buyer),
                    format_amount(trade.amount),
                    trade.status
                );
            }
            println!("{} trades", trades.len());
            return Ok(());
        }
        Command::Approve { asset: ApproveTarget::Token } => Action::ApproveToken,
        Command::Approve { asset: ApproveTarget::Stable } => Action::ApproveStable,
        Command::CreateTrade { buyer, amount } => Action::CreateTrade { buyer, amount },
        Command::Release { id } => Action::ReleaseTrade(find_trade(&snapshot, id)?),
        Command::Cancel { id } => Action::CancelTrade(find_trade(&snapshot, id)?),
        Command::Resolve { id, recipient } => Action::ResolveDispute { trade_id: id, recipient },
        Command::Buy { method, amount, info } => match method {
            PaymentMethod::Native => Action::BuyWithNative { amount },
            PaymentMethod::Stable => Action::BuyWithStable { amount },
            PaymentMethod::Other => Action::BuyOffPlatform { amount, method_info: info },
        },
        Command::Transfer { to, amount } => Action::DirectTransfer { recipient: to, amount },
        Command::SetRates { native, stable } => Action::SetExchangeRates { native, stable },
    };

    let report = desk.perform(action).await?;
    println!("{}", report.message);
    if let Some(tx_hash) = report.tx_hash {
        println!("Transaction: {}", tx_hash);
    }
    Ok(())
}

fn find_trade(snapshot: &otc_desk::DeskSnapshot, id: u64) -> anyhow::Result<otc_desk::Trade> {
    snapshot
        .trades
        .iter()
        .find(|trade| trade.id == id)
        .cloned()
        .ok_or_else(|| anyhow!("Trade #{} not found in the escrow ledger", id))
}
