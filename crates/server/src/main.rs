#[tokio::main]
async fn main() -> apiary_server::Result<()> {
    apiary_server::init_tracing();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "apiary server starting"
    );
    apiary_server::run().await
}
