use anyhow::Result;
use clap::Parser;
use tabbly::application::AppError;
use tabbly::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.init_tracing();

    if let Err(err) = cli.run().await {
        // Missing lists/transactions exit with a distinct status
        if err
            .downcast_ref::<AppError>()
            .is_some_and(AppError::is_not_found)
        {
            eprintln!("{}", err);
            std::process::exit(2);
        }
        return Err(err);
    }
    Ok(())
}
