// src/main.rs

use dagspec::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("dagspec error: {err:?}");
            std::process::exit(2);
        }
    }
}

/// Returns whether the job succeeded (a dry run always does).
async fn run_main() -> anyhow::Result<bool> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    let summary = run(args).await?;
    Ok(summary.is_none_or(|s| s.succeeded()))
}
