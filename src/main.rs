use clap::Parser;
use tickforge::cli as cli_mod;
use tickforge::cli::{Cli, Commands};
use tracing::error;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Run(args) => cli_mod::run::execute(&cli, args).await,
        Commands::Status => {
            cli_mod::status::execute(std::path::Path::new(cli_mod::status::DEFAULT_STATUS_PATH));
            Ok(())
        }
        Commands::Journal(args) => cli_mod::journal::execute(args).await,
        Commands::Backtest(args) => cli_mod::backtest::execute(args).await,
    };

    if let Err(e) = result {
        error!(error = %e, "fatal error");
        std::process::exit(1);
    }
}
