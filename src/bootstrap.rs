//! Process wiring shared by the server binary and the CLI.

use std::sync::Arc;

use anyhow::Context;
use sqlx::SqlitePool;

use bookwish_authz::AdminGate;
use bookwish_kernel::{settings::Settings, InitCtx, ModuleRegistry};

use crate::modules::{
    self,
    books::{catalog, enrichment::PerplexityClient, routes::BooksState, store::BookStore},
};

/// Build the books module state from configuration and an open pool.
pub fn build_books_state(settings: &Settings, pool: SqlitePool) -> anyhow::Result<BooksState> {
    let catalog = catalog::from_settings(&settings.catalog)
        .context("failed to build catalog client")?;
    let enricher =
        PerplexityClient::new(&settings.enrichment).context("failed to build enrichment client")?;

    Ok(BooksState {
        store: BookStore::new(pool),
        catalog,
        enricher: Arc::new(enricher),
        admin: AdminGate::from_settings(&settings.auth),
        search_page_size: settings.catalog.page_size.max(1),
    })
}

pub fn build_registry(settings: &Settings, pool: SqlitePool) -> anyhow::Result<ModuleRegistry> {
    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry, build_books_state(settings, pool)?);
    Ok(registry)
}

/// Apply pending migrations of every registered module.
pub async fn apply_migrations(registry: &ModuleRegistry, pool: &SqlitePool) -> anyhow::Result<usize> {
    let migrations = registry.collect_migrations();
    let applied = bookwish_db::apply_migrations(pool, &migrations).await?;
    tracing::info!(applied, known = migrations.len(), "schema up to date");
    Ok(applied)
}

/// Connect and bring the schema up to date. Returns the number applied.
pub async fn migrate(settings: &Settings) -> anyhow::Result<usize> {
    let pool = bookwish_db::connect(&settings.database).await?;
    let registry = build_registry(settings, pool.clone())?;
    let applied = apply_migrations(&registry, &pool).await;
    pool.close().await;
    applied
}

/// Open the wishlist store with the schema applied.
pub async fn open_store(settings: &Settings) -> anyhow::Result<BookStore> {
    let pool = bookwish_db::connect(&settings.database).await?;
    let registry = build_registry(settings, pool.clone())?;
    apply_migrations(&registry, &pool).await?;
    Ok(BookStore::new(pool))
}

/// Run the HTTP server until a shutdown signal arrives.
pub async fn run(settings: &Settings) -> anyhow::Result<()> {
    let pool = bookwish_db::connect(&settings.database).await?;
    let registry = build_registry(settings, pool.clone())?;
    let ctx = InitCtx { settings };

    registry.init_modules(&ctx).await?;
    apply_migrations(&registry, &pool).await?;
    registry.start_modules(&ctx).await?;

    tracing::info!(modules = registry.module_count(), "bookwish bootstrap complete");

    let served = bookwish_http::start_server(&registry, settings).await;

    registry.stop_modules().await?;
    pool.close().await;
    served
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use bookwish_kernel::settings::{DatabaseSettings, Secret};
    use tower::ServiceExt;

    fn test_settings() -> Settings {
        let mut settings = Settings::default();
        settings.database = DatabaseSettings::in_memory();
        settings.auth.admin_password = Some(Secret::new("s3cret"));
        settings
    }

    #[tokio::test]
    async fn migrations_apply_once() {
        let settings = test_settings();
        let pool = bookwish_db::connect(&settings.database).await.unwrap();
        let registry = build_registry(&settings, pool.clone()).unwrap();

        assert_eq!(apply_migrations(&registry, &pool).await.unwrap(), 2);
        assert_eq!(apply_migrations(&registry, &pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn assembled_app_serves_api_and_health() {
        let settings = test_settings();
        let pool = bookwish_db::connect(&settings.database).await.unwrap();
        let registry = build_registry(&settings, pool.clone()).unwrap();
        apply_migrations(&registry, &pool).await.unwrap();

        let app = bookwish_http::build_router(&registry, &settings);

        let health = app
            .clone()
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let wishlist = app
            .clone()
            .oneshot(Request::builder().uri("/api/wishlist").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(wishlist.status(), StatusCode::OK);
        assert!(wishlist.headers().contains_key("x-request-id"));

        let verify = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/verify-admin")
                    .header("X-Admin-Password", "s3cret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(verify.status(), StatusCode::OK);
    }
}
