//! `agents-hub` entry point.

#![forbid(unsafe_code)]

#[tokio::main]
async fn main() {
    let code = agents_hub::cli::run().await;
    std::process::exit(code);
}
