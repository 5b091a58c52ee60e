// src/main.rs

use qcflow::{cli, logging, run};

#[tokio::main]
async fn main() {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("qcflow error: {err}");
        std::process::exit(err.exit_code());
    }
    if let Err(err) = run(args).await {
        eprintln!("qcflow error: {err}");
        std::process::exit(err.exit_code());
    }
}
