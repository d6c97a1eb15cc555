use clap::Parser;

use job_polling::cli::{self, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli::run(&cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
