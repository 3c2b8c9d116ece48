use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vidtax_pipeline::Stage;

#[derive(Parser, Debug)]
#[command(name = "vidtax", version, about = "Resumable video topic taxonomy pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every stage in order, or only the one named.
    Run {
        /// Run a single stage
        #[arg(long, value_enum)]
        stage: Option<Stage>,

        /// Configuration file, instead of the user config directory's vidtax/config.toml
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    match cli.command {
        Command::Run { stage, config } => {
            vidtax_pipeline::try_main(stage, config.as_deref()).await
        }
    }
}
