//! Command-line surface for the referral dashboard and the swap widget.
//!
//! Views are printed to stdout; logs go to stderr.

use std::{future::Future, time::Duration};

use bigdecimal::BigDecimal;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::{signal, sync::watch, time::timeout};
use tracing::{info, warn};

use crate::{
    configuration::{get_configuration, set_configuration, AppState, Config},
    error::Error,
    handler::{
        balances::balance_of,
        quote_aggregator::{MarketRow, QuoteAggregator},
        referral_dashboard::{DashboardView, ReferralDashboard},
        swap_widget::{SwapIntent, SwapRoute, SwapWidget},
    },
    helpers::{get_big_number, get_price, resolve_symbol, truncate_symbol},
    model::LeaderboardSort,
    provider::{
        BalanceApi, KeypairSigner, QuoteFeed, QuoteStream, WalletSigner, HTTP,
    },
    storage::{FileStore, KeyValueStore, REFERRAL_CODE_KEY},
};

/// Referral dashboard and token swap client
#[derive(Parser)]
#[command(name = "refswap")]
#[command(about = "Referral dashboard and token swap client", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show referral stats and the leaderboard
    Referral {
        /// Leaderboard order: volume, new or soon
        #[arg(long, default_value = "volume")]
        sort: LeaderboardSort,

        /// Keep polling and refresh the countdowns every second
        #[arg(long)]
        watch: bool,
    },

    /// Store the referral code shown by the dashboard
    SetReferral { code: String },

    /// Stream exchange quotes for a symbol, sorted by spread
    Quotes {
        #[arg(long)]
        symbol: Option<String>,
    },

    /// Show balances of the configured wallet
    Balances,

    /// Quote a swap and optionally sign and submit it
    Swap {
        /// Amount of the source token
        #[arg(long)]
        amount: BigDecimal,

        /// Source token address (defaults to USDC)
        #[arg(long)]
        from: Option<String>,

        /// Destination token address (defaults to the stored preference)
        #[arg(long)]
        to: Option<String>,

        /// Trading symbol used for the quote feed
        #[arg(long)]
        symbol: Option<String>,

        /// Price from this exchange's feed instead of the backend quote
        #[arg(long)]
        exchange: Option<String>,

        /// Referral code passed to the swap backend
        #[arg(long = "ref")]
        referral: Option<String>,

        /// Sign and submit the quoted transaction
        #[arg(long)]
        submit: bool,
    },
}

pub struct SwapArgs {
    pub amount: BigDecimal,
    pub from: Option<String>,
    pub to: Option<String>,
    pub symbol: Option<String>,
    pub exchange: Option<String>,
    pub referral: Option<String>,
    pub submit: bool,
}

/// Initialize configuration and return Config
pub fn init_config() -> Result<Config, Error> {
    set_configuration()?;
    get_configuration()
}

fn wallet_signer(config: &Config) -> Result<Option<KeypairSigner>, Error> {
    match &config.wallet_seed {
        Some(seed) => {
            let signer = KeypairSigner::from_hex_seed(seed)?;
            info!("Trading wallet {}", signer.address());
            Ok(Some(signer))
        },
        None => {
            warn!("WALLET_SEED not set, swaps can not be signed");
            Ok(None)
        },
    }
}

pub async fn run_referral(
    sort: LeaderboardSort,
    watch: bool,
) -> Result<(), Error> {
    let config = init_config()?;
    let http = AppState::new(HTTP::new(config.clone())?);
    let store = AppState::new(FileStore::new(&config.store_path));
    let dashboard = ReferralDashboard::new(&config, http, store)?;

    dashboard.load_code()?;
    if let Err(e) = dashboard.load_info().await {
        warn!("Referral info unavailable: {}", e);
    }

    if !watch {
        if let Err(e) = dashboard.refresh_leaderboard(sort).await {
            warn!("Leaderboard unavailable: {}", e);
        }
        print_dashboard(&dashboard.view(Utc::now())?);
        return Ok(());
    }

    dashboard.start_leaderboard(sort)?;
    let mut clock = dashboard.start_countdown()?;

    loop {
        tokio::select! {
            changed = clock.changed() => {
                if changed.is_err() {
                    break;
                }
            },
            _ = signal::ctrl_c() => break,
        }

        let now = *clock.borrow_and_update();
        print_dashboard(&dashboard.view(now)?);
    }

    dashboard.stop()
}

pub fn run_set_referral(code: &str) -> Result<(), Error> {
    let config = init_config()?;
    let store = FileStore::new(&config.store_path);

    store.init()?;
    store.write(REFERRAL_CODE_KEY, code)?;
    info!("Referral code {} stored in {}", code, config.store_path);

    Ok(())
}

pub async fn run_quotes(symbol: Option<String>) -> Result<(), Error> {
    let config = init_config()?;
    let symbol = resolve_symbol(symbol.as_deref(), "")
        .ok_or_else(|| Error::MissingParams(String::from("symbol")))?;

    let feed = QuoteStream::new(config);
    let mut subscription = feed.subscribe(&symbol)?;
    let mut aggregator = QuoteAggregator::new(Some(symbol));

    loop {
        tokio::select! {
            event = subscription.next() => match event {
                Some(event) => {
                    aggregator.apply(event);
                    print_markets(&aggregator.rows(None));
                },
                None => break,
            },
            _ = signal::ctrl_c() => break,
        }
    }

    Ok(())
}

pub async fn run_balances() -> Result<(), Error> {
    let config = init_config()?;
    let signer = wallet_signer(&config)?
        .ok_or_else(|| Error::MissingParams(String::from("WALLET_SEED")))?;
    let wallet = signer.address();
    let http = HTTP::new(config.clone())?;

    let balances = http.balances(wallet).await?;
    let mut tokens: Vec<&String> = balances.keys().collect();
    tokens.sort();

    println!("Balances of {}", wallet);
    for token in tokens {
        let symbol = config.symbol_of(token).unwrap_or(token.as_str());
        println!(
            "  {:<12} {}",
            truncate_symbol(symbol),
            get_big_number(balance_of(&balances, token))
        );
    }

    Ok(())
}

pub async fn run_swap(args: SwapArgs) -> Result<(), Error> {
    let config = init_config()?;
    let wallet = wallet_signer(&config)?;
    let http = AppState::new(HTTP::new(config.clone())?);
    let store = AppState::new(FileStore::new(&config.store_path));
    let route = SwapRoute {
        path: String::new(),
        symbol: args.symbol,
        referral: args.referral,
    };

    let (widget, mut notifications) =
        SwapWidget::new(&config, http, wallet, store, route)?;
    let limit = Duration::from_secs(config.timeout);

    if let Some(from) = &args.from {
        let symbol = config.symbol_of(from).unwrap_or(from.as_str());
        widget.select_from(from, symbol)?;
    }
    if let Some(to) = &args.to {
        let symbol = config.symbol_of(to).unwrap_or(to.as_str());
        widget.select_to(to, symbol)?;
    }
    widget.start_balances()?;

    let mut updates = widget.subscribe_updates();

    if let Some(exchange) = &args.exchange {
        let symbol = widget
            .intent()?
            .symbol
            .ok_or_else(|| Error::MissingParams(String::from("symbol")))?;
        let subscription = QuoteStream::new(config.clone()).subscribe(&symbol)?;

        widget.pin_exchange(exchange)?;
        widget.set_from_amount(Some(args.amount))?;

        let priced = wait_for(&mut updates, limit, "exchange price", || {
            Ok(widget.markets()?.iter().any(|row| row.pinned))
        });
        tokio::select! {
            result = priced => result?,
            result = widget.run_feed(subscription) => {
                result?;
                return Err(Error::Timeout(String::from("quote feed")));
            },
        }

        print_markets(&widget.markets()?);
        print_intent(&widget.intent()?);
        if args.submit {
            warn!("Pinned prices carry no transaction, nothing to submit");
        }
        return Ok(());
    }

    widget.settle_amount(Some(args.amount))?;

    wait_for(&mut updates, limit, "swap quote", || {
        let intent = widget.intent()?;
        if let Some(error) = intent.quote_error {
            return Err(Error::MissingParams(error));
        }
        Ok(intent.quote.live().is_some())
    })
    .await?;

    print_intent(&widget.intent()?);

    if args.submit {
        let result = widget.submit().await;
        while let Ok(notification) = notifications.try_recv() {
            println!("{}", notification);
        }
        let response = result?;
        info!("Swap response: {}", response);
    }

    Ok(())
}

/// Waits until `ready` holds, re-checking after every update.
fn wait_for<'a, F>(
    updates: &'a mut watch::Receiver<u64>,
    limit: Duration,
    what: &'static str,
    mut ready: F,
) -> impl Future<Output = Result<(), Error>> + 'a
where
    F: FnMut() -> Result<bool, Error> + 'a,
{
    async move {
        let wait = async {
            loop {
                if ready()? {
                    return Ok(());
                }
                if updates.changed().await.is_err() {
                    return Err(Error::Timeout(what.to_owned()));
                }
            }
        };

        match timeout(limit, wait).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(what.to_owned())),
        }
    }
}

fn print_dashboard(view: &DashboardView) {
    match (&view.code, &view.share_link) {
        (Some(code), Some(link)) => {
            println!("Referral code: {}", code);
            println!("Share and earn: {}", link);
        },
        _ => println!("No referral code stored, use `set-referral <code>`"),
    }
    if let Some(error) = &view.info_error {
        println!("Referral info failed: {}", error);
    }

    println!();
    for card in &view.stats {
        println!("{:<16} {:>14} {:>14}", card.title, card.sol, card.usd);
    }

    println!();
    println!("{}", view.title);
    println!("{}", view.description);
    if let Some(error) = &view.leaderboard_error {
        println!("Leaderboard refresh failed: {}", error);
    }

    println!(
        "{:>4} {:<16} {:>14} {:>14} {:>10} {:>8} {:>12}",
        "#", "Author", "Reward Time", "Volume", "Reward", "Traders", "Extra"
    );
    for row in &view.rows {
        let rank = row.rank.map(|r| format!("#{}", r)).unwrap_or_default();
        println!(
            "{:>4} {:<16} {:>14} {:>14} {:>10} {:>8} {:>12}  {}",
            rank,
            row.ref_id,
            row.countdown,
            row.volume,
            row.reward,
            row.traders,
            row.extra_reward,
            row.trade_link
        );
    }
}

fn print_markets(rows: &[MarketRow]) {
    println!("{:<14} {:>14} {:>14} {:>8}", "Exchange", "Price", "Rate", "Spread");
    for row in rows {
        let spread = row
            .spread
            .as_ref()
            .map(|spread| format!("{}%", spread))
            .unwrap_or_default();
        let marker = if row.pinned { "*" } else { "" };
        println!(
            "{:<14} {:>14} {:>14} {:>8} {}",
            row.exchange,
            format!("${}", row.price),
            row.rate,
            spread,
            marker
        );
    }
}

fn print_intent(intent: &SwapIntent) {
    let amount = |value: &Option<BigDecimal>| {
        value.as_ref().map(get_price).unwrap_or_else(|| String::from("-"))
    };
    let symbol = |value: &Option<String>| {
        value
            .as_deref()
            .map(truncate_symbol)
            .unwrap_or_else(|| String::from("?"))
    };

    println!(
        "Selling {} {} for {} {}",
        amount(&intent.from_amount),
        symbol(&intent.from_symbol),
        amount(&intent.to_amount),
        symbol(&intent.to_symbol)
    );
    if let Some(quote) = intent.quote.latest() {
        println!("Price {}", get_price(&quote.price));
    }
    if let Some(exchange) = &intent.pinned {
        println!("Priced on {}", exchange);
    }
}
