use vantage_core::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    vantage_server::init_tracing();
    let config = AppConfig::load_with_env()?;
    vantage_server::run(config).await
}
