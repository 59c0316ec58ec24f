pub mod catalog;
pub mod enrichment;
pub mod models;
pub mod routes;
pub mod stats;
pub mod store;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use bookwish_kernel::{InitCtx, Migration, Module};

use routes::BooksState;

/// The wishlist: catalog search, enrichment, persistence and statistics.
pub struct BooksModule {
    state: BooksState,
}

impl BooksModule {
    pub fn new(state: BooksState) -> Self {
        Self { state }
    }
}

pub fn create_module(state: BooksState) -> Arc<dyn Module> {
    Arc::new(BooksModule::new(state))
}

/// Ordered schema for the `books` table. `002_title_unique` keeps the oldest
/// row of each case-insensitive title before enforcing uniqueness.
pub(crate) fn schema_migrations() -> Vec<Migration> {
    vec![
        Migration {
            id: "001_init",
            up: r#"
                CREATE TABLE IF NOT EXISTS books (
                    id          INTEGER PRIMARY KEY AUTOINCREMENT,
                    title       TEXT NOT NULL,
                    author      TEXT NOT NULL,
                    description TEXT,
                    region      TEXT,
                    subjects    TEXT,
                    is_fiction  TEXT,
                    is_owned    INTEGER NOT NULL DEFAULT 0
                );
                CREATE INDEX IF NOT EXISTS books_title_idx ON books (title);
            "#,
        },
        Migration {
            id: "002_title_unique",
            up: r#"
                DELETE FROM books
                    WHERE id NOT IN (SELECT MIN(id) FROM books GROUP BY title COLLATE NOCASE);
                CREATE UNIQUE INDEX IF NOT EXISTS books_title_nocase_unique
                    ON books (title COLLATE NOCASE);
            "#,
        },
    ]
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    fn mount_path(&self) -> String {
        "/api".to_string()
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            catalog = ?ctx.settings.catalog.provider,
            admin_configured = self.state.admin.is_configured(),
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        routes::router().with_state(self.state.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(openapi_fragment())
    }

    fn migrations(&self) -> Vec<Migration> {
        schema_migrations()
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        let total = self.state.store.count().await?;
        tracing::info!(module = self.name(), books = total, "books module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

fn error_response(description: &str) -> serde_json::Value {
    serde_json::json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/ErrorResponse" }
            }
        }
    })
}

fn json_response(description: &str, schema: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "description": description,
        "content": { "application/json": { "schema": schema } }
    })
}

fn schema_ref(name: &str) -> serde_json::Value {
    serde_json::json!({ "$ref": format!("#/components/schemas/{name}") })
}

fn openapi_fragment() -> serde_json::Value {
    let admin_header = serde_json::json!({
        "name": "X-Admin-Password",
        "in": "header",
        "required": false,
        "schema": { "type": "string" }
    });
    let id_param = serde_json::json!({
        "name": "id",
        "in": "path",
        "required": true,
        "schema": { "type": "integer", "format": "int64" }
    });
    let page_params = serde_json::json!([
        { "name": "page", "in": "query", "schema": { "type": "integer", "default": 1, "minimum": 1 } },
        { "name": "size", "in": "query", "schema": { "type": "integer", "default": 12, "minimum": 1 } }
    ]);
    let wishlist_get = serde_json::json!({
        "get": {
            "summary": "List the wishlist, newest first",
            "tags": ["Books"],
            "parameters": page_params,
            "responses": {
                "200": json_response("One page of books", schema_ref("WishlistPage")),
                "400": error_response("Invalid paging parameters")
            }
        }
    });
    let summary_map = serde_json::json!({
        "type": "object",
        "additionalProperties": { "type": "array", "items": schema_ref("BookSummary") }
    });

    serde_json::json!({
        "paths": {
            "/search": {
                "get": {
                    "summary": "Search the external catalog",
                    "tags": ["Books"],
                    "parameters": [
                        { "name": "q", "in": "query", "schema": { "type": "string" } },
                        { "name": "page", "in": "query", "schema": { "type": "integer", "default": 1 } }
                    ],
                    "responses": {
                        "200": json_response(
                            "Search results",
                            serde_json::json!({ "type": "array", "items": schema_ref("SearchResult") })
                        )
                    }
                }
            },
            "/add": {
                "post": {
                    "summary": "Enrich a selected book and add it to the wishlist",
                    "tags": ["Books"],
                    "parameters": [admin_header.clone()],
                    "requestBody": {
                        "required": true,
                        "content": { "application/json": { "schema": schema_ref("BookSelection") } }
                    },
                    "responses": {
                        "200": json_response("Added or already present", schema_ref("StatusMessage")),
                        "404": error_response("Could not fetch book details"),
                        "500": error_response("Storage failure")
                    }
                }
            },
            "/books/{id}": {
                "patch": {
                    "summary": "Set the ownership flag",
                    "tags": ["Books"],
                    "parameters": [admin_header.clone(), id_param.clone()],
                    "requestBody": {
                        "required": true,
                        "content": { "application/json": { "schema": schema_ref("OwnershipUpdate") } }
                    },
                    "responses": {
                        "200": json_response("Updated", schema_ref("StatusMessage")),
                        "400": error_response("Missing is_owned"),
                        "401": error_response("Invalid admin password"),
                        "404": error_response("Book not found")
                    }
                },
                "delete": {
                    "summary": "Remove a book",
                    "tags": ["Books"],
                    "parameters": [admin_header.clone(), id_param],
                    "responses": {
                        "200": json_response("Deleted", schema_ref("StatusMessage")),
                        "401": error_response("Invalid admin password"),
                        "404": error_response("Book not found")
                    }
                }
            },
            "/stats": {
                "get": {
                    "summary": "Aggregate statistics",
                    "tags": ["Books"],
                    "responses": {
                        "200": json_response("Statistics report", schema_ref("StatsReport"))
                    }
                }
            },
            "/wishlist": wishlist_get.clone(),
            "/toread": wishlist_get,
            "/verify-admin": {
                "post": {
                    "summary": "Check the admin password",
                    "tags": ["Books"],
                    "parameters": [admin_header],
                    "responses": {
                        "200": json_response("Valid", schema_ref("StatusMessage")),
                        "401": error_response("Invalid admin password")
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "SearchResult": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "authors": { "type": "string" },
                        "key": { "type": "string" },
                        "subjects": { "type": "array", "items": { "type": "string" } }
                    },
                    "required": ["title", "authors", "key", "subjects"]
                },
                "BookSelection": {
                    "type": "object",
                    "properties": {
                        "book_key": { "type": "string" },
                        "title": { "type": "string" },
                        "authors_str": { "type": "string" },
                        "subjects": { "type": "array", "items": { "type": "string" } },
                        "is_owned": { "type": "boolean", "default": false }
                    },
                    "required": ["title"]
                },
                "OwnershipUpdate": {
                    "type": "object",
                    "properties": { "is_owned": { "type": "boolean" } },
                    "required": ["is_owned"]
                },
                "StatusMessage": {
                    "type": "object",
                    "properties": {
                        "status": { "type": "string" },
                        "message": { "type": "string" }
                    },
                    "required": ["status"]
                },
                "BookSummary": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "author": { "type": "string" }
                    },
                    "required": ["title", "author"]
                },
                "WishlistItem": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "integer", "format": "int64" },
                        "title": { "type": "string" },
                        "author": { "type": "string" },
                        "description": { "type": ["string", "null"] },
                        "region": { "type": ["string", "null"] },
                        "subjects": { "type": "array", "items": { "type": "string" } },
                        "is_fiction": { "type": "string", "enum": ["Fiction", "Non-Fiction", "Unknown"] },
                        "is_owned": { "type": "boolean" }
                    },
                    "required": ["id", "title", "author", "subjects", "is_fiction", "is_owned"]
                },
                "WishlistPage": {
                    "type": "object",
                    "properties": {
                        "items": { "type": "array", "items": schema_ref("WishlistItem") },
                        "total": { "type": "integer" },
                        "page": { "type": "integer" },
                        "size": { "type": "integer" },
                        "total_pages": { "type": "integer" }
                    },
                    "required": ["items", "total", "page", "size", "total_pages"]
                },
                "StatsReport": {
                    "type": "object",
                    "properties": {
                        "total_books": { "type": "integer" },
                        "unique_authors": { "type": "integer" },
                        "regions": summary_map.clone(),
                        "categories": summary_map.clone(),
                        "top_subjects": summary_map.clone(),
                        "top_authors": summary_map.clone(),
                        "ownership": summary_map
                    },
                    "required": [
                        "total_books", "unique_authors", "regions", "categories",
                        "top_subjects", "top_authors", "ownership"
                    ]
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::books::catalog::CatalogSearch;
    use crate::modules::books::enrichment::MetadataSource;
    use crate::modules::books::models::{BookDetails, SearchPage};
    use bookwish_authz::AdminGate;
    use bookwish_kernel::{settings::DatabaseSettings, ModuleRegistry};

    struct NoCatalog;

    #[async_trait]
    impl CatalogSearch for NoCatalog {
        async fn search(&self, _query: &str, _page: u32, _page_size: u32) -> SearchPage {
            SearchPage::empty()
        }
    }

    struct NoEnrichment;

    #[async_trait]
    impl MetadataSource for NoEnrichment {
        async fn get_details(&self, _title: &str, _author: &str) -> Option<BookDetails> {
            None
        }
    }

    #[test]
    fn migrations_have_unique_ordered_ids() {
        let ids: Vec<&str> = schema_migrations().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["001_init", "002_title_unique"]);
    }

    #[tokio::test]
    async fn title_index_collapses_legacy_case_duplicates() {
        let pool = bookwish_db::connect(&DatabaseSettings::in_memory()).await.unwrap();
        let all: Vec<(String, Migration)> = schema_migrations()
            .into_iter()
            .map(|m| ("books".to_string(), m))
            .collect();

        bookwish_db::apply_migrations(&pool, &all[..1]).await.unwrap();
        for title in ["Dune", "DUNE", "Emma", "dune"] {
            sqlx::query("INSERT INTO books (title, author) VALUES (?, 'someone')")
                .bind(title)
                .execute(&pool)
                .await
                .unwrap();
        }

        assert_eq!(bookwish_db::apply_migrations(&pool, &all).await.unwrap(), 1);

        let titles: Vec<String> = sqlx::query_scalar("SELECT title FROM books ORDER BY id")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(titles, vec!["Dune", "Emma"]);

        let clash = sqlx::query("INSERT INTO books (title, author) VALUES ('dUnE', 'someone')")
            .execute(&pool)
            .await;
        assert!(clash.is_err());
    }

    #[tokio::test]
    async fn openapi_paths_land_under_api() {
        let state = BooksState {
            store: store::test_store().await,
            catalog: Arc::new(NoCatalog),
            enricher: Arc::new(NoEnrichment),
            admin: AdminGate::default(),
            search_page_size: 20,
        };
        let mut registry = ModuleRegistry::new();
        registry.register(create_module(state));

        let spec = bookwish_http::router::merged_openapi(&registry);
        for path in [
            "/api/search",
            "/api/add",
            "/api/books/{id}",
            "/api/stats",
            "/api/wishlist",
            "/api/toread",
            "/api/verify-admin",
        ] {
            assert!(spec["paths"][path].is_object(), "missing {path}");
        }
        assert!(spec["components"]["schemas"]["StatsReport"].is_object());
    }
}
