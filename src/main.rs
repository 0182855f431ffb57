use clap::Parser;
use sampleholder::cli::{self, Cli};
use sampleholder::{init_logging, BUILD_DATE, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose)?;
    tracing::debug!("sampleholder {} built {}", VERSION, BUILD_DATE);

    cli::execute(cli).await
}
