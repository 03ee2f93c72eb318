use clap::Parser;
use log::error;

use lima::command::Commands;

#[derive(Parser)]
#[command(name = "lima")]
#[command(about = "Demultiplex barcoded long-read data and clip barcodes", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Demux(mut cmd) => cmd.try_execute(),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
