use anyhow::Context;
use bookwish_kernel::settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load bookwish settings")?;
    bookwish_telemetry::init(&settings.telemetry)?;

    tracing::info!(
        env = ?settings.environment,
        db = %settings.database.url,
        "bookwish-app bootstrap starting"
    );

    bookwish_app::run(&settings).await
}
