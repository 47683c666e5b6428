use clap::Parser;
use tracing::{error, Level};

use refswap::{
    cli::{
        run_balances, run_quotes, run_referral, run_set_referral, run_swap,
        Cli, Commands, SwapArgs,
    },
    error::Error,
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let result = app_main().await;

    if let Err(err) = &result {
        error!("{}", err);
    }

    result
}

async fn app_main() -> Result<(), Error> {
    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_level(true)
        .with_max_level(Level::INFO)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Referral { sort, watch } => run_referral(sort, watch).await,
        Commands::SetReferral { code } => run_set_referral(&code),
        Commands::Quotes { symbol } => run_quotes(symbol).await,
        Commands::Balances => run_balances().await,
        Commands::Swap {
            amount,
            from,
            to,
            symbol,
            exchange,
            referral,
            submit,
        } => {
            run_swap(SwapArgs {
                amount,
                from,
                to,
                symbol,
                exchange,
                referral,
                submit,
            })
            .await
        },
    }
}
