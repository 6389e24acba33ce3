use std::process;

#[tokio::main]
async fn main() {
    if let Err(e) = yarec::app::run().await {
        tracing::error!("Fatal: {e:#}");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
