use std::error::Error;

use tracing_subscriber::EnvFilter;

use agenda::config::AppConfig;

#[rocket::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load()?;
    let state = agenda::bootstrap(&config).await?;

    agenda::build_rocket(state, &config).launch().await?;

    Ok(())
}
