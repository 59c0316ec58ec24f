//! HTTP handlers for the wishlist API, mounted under `/api`.

use std::sync::Arc;

use axum::{
    extract::{FromRef, Path, Query, State},
    routing::{get, patch, post},
    Json, Router,
};

use bookwish_authz::{AdminGate, AdminStatus, RequireAdmin};
use bookwish_http::error::AppError;

use super::catalog::CatalogSearch;
use super::enrichment::MetadataSource;
use super::models::{
    BookDetails, BookSelection, NewBook, OwnershipUpdate, PageParams, SearchParams, SearchResult,
    StatusMessage, WishlistItem, WishlistPage,
};
use super::stats::StatsReport;
use super::store::{BookStore, StoreError};
use crate::utils::join_list;

const DEFAULT_PAGE_SIZE: i64 = 12;

/// Shared state handed to every books handler.
#[derive(Clone)]
pub struct BooksState {
    pub store: BookStore,
    pub catalog: Arc<dyn CatalogSearch>,
    pub enricher: Arc<dyn MetadataSource>,
    pub admin: AdminGate,
    pub search_page_size: u32,
}

impl FromRef<BooksState> for AdminGate {
    fn from_ref(state: &BooksState) -> Self {
        state.admin.clone()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Internal(err.into())
    }
}

pub fn router() -> Router<BooksState> {
    Router::new()
        .route("/search", get(search))
        .route("/add", post(add_book))
        .route("/books/{id}", patch(update_ownership).delete(delete_book))
        .route("/stats", get(stats))
        .route("/wishlist", get(wishlist))
        .route("/toread", get(wishlist))
        .route("/verify-admin", post(verify_admin))
}

async fn search(
    State(state): State<BooksState>,
    Query(params): Query<SearchParams>,
) -> Json<Vec<SearchResult>> {
    let query = params.q.unwrap_or_default();
    let page = u32::try_from(params.page.unwrap_or(1).max(1)).unwrap_or(u32::MAX);

    let found = state
        .catalog
        .search(&query, page, state.search_page_size)
        .await;

    Json(found.hits.into_iter().map(SearchResult::from).collect())
}

async fn add_book(
    State(state): State<BooksState>,
    AdminStatus { is_admin }: AdminStatus,
    Json(selection): Json<BookSelection>,
) -> Result<Json<StatusMessage>, AppError> {
    tracing::info!(title = %selection.title, key = %selection.book_key, "adding book");

    let details = state
        .enricher
        .get_details(&selection.title, &selection.authors_str)
        .await
        .ok_or_else(|| AppError::not_found("Could not fetch book details."))?;

    if selection.is_owned && !is_admin {
        tracing::warn!(title = %selection.title, "ownership requested without admin; storing as not owned");
    }
    let is_owned = selection.is_owned && is_admin;

    let book = merge_selection(selection, details, is_owned);
    let outcome = state.store.add(&book).await?;

    Ok(Json(StatusMessage::success(outcome.message(&book.title))))
}

/// Enrichment wins; the selection fills whatever enrichment left empty.
fn merge_selection(selection: BookSelection, details: BookDetails, is_owned: bool) -> NewBook {
    let author = if details.authors.is_empty() {
        selection.authors_str
    } else {
        join_list(&details.authors)
    };
    let subjects = if details.subjects.is_empty() {
        selection.subjects
    } else {
        details.subjects
    };

    NewBook {
        title: details.title.unwrap_or(selection.title),
        author,
        description: details.description,
        region: details.region,
        subjects,
        is_fiction: details.is_fiction,
        is_owned,
    }
}

async fn update_ownership(
    _admin: RequireAdmin,
    State(state): State<BooksState>,
    Path(id): Path<i64>,
    Json(update): Json<OwnershipUpdate>,
) -> Result<Json<StatusMessage>, AppError> {
    let is_owned = update
        .is_owned
        .ok_or_else(|| AppError::bad_request("Missing 'is_owned' field"))?;

    if !state.store.update_ownership(id, is_owned).await? {
        return Err(AppError::not_found("Book not found"));
    }

    tracing::info!(id, is_owned, "ownership updated");
    Ok(Json(StatusMessage::success("Ownership updated")))
}

async fn delete_book(
    _admin: RequireAdmin,
    State(state): State<BooksState>,
    Path(id): Path<i64>,
) -> Result<Json<StatusMessage>, AppError> {
    if !state.store.delete(id).await? {
        return Err(AppError::not_found("Book not found"));
    }

    tracing::info!(id, "book deleted");
    Ok(Json(StatusMessage::success("Book deleted")))
}

async fn stats(State(state): State<BooksState>) -> Result<Json<StatsReport>, AppError> {
    Ok(Json(state.store.aggregate_stats().await?))
}

async fn wishlist(
    State(state): State<BooksState>,
    Query(params): Query<PageParams>,
) -> Result<Json<WishlistPage>, AppError> {
    let page = params.page.unwrap_or(1);
    let size = params.size.unwrap_or(DEFAULT_PAGE_SIZE);

    let invalid: Vec<serde_json::Value> = [("page", page), ("size", size)]
        .into_iter()
        .filter(|(_, value)| *value < 1)
        .map(|(field, value)| {
            serde_json::json!({ "field": field, "value": value, "issue": "must be at least 1" })
        })
        .collect();
    if !invalid.is_empty() {
        return Err(AppError::invalid_fields(invalid, "Invalid pagination"));
    }

    let skip = (page - 1).saturating_mul(size);
    let books = state.store.list(skip, size).await?;
    let total = state.store.count().await?;

    Ok(Json(WishlistPage {
        items: books.into_iter().map(WishlistItem::from).collect(),
        total,
        page,
        size,
        total_pages: total / size + i64::from(total % size != 0),
    }))
}

async fn verify_admin(_admin: RequireAdmin) -> Json<StatusMessage> {
    Json(StatusMessage::ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::books::models::{Classification, SearchHit, SearchPage};
    use crate::modules::books::store::test_store;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use tower::ServiceExt;

    const SECRET: &str = "letmein";

    #[derive(Default)]
    struct FakeCatalog {
        page: SearchPage,
        calls: Mutex<Vec<(String, u32, u32)>>,
    }

    #[async_trait]
    impl CatalogSearch for FakeCatalog {
        async fn search(&self, query: &str, page: u32, page_size: u32) -> SearchPage {
            self.calls
                .lock()
                .unwrap()
                .push((query.to_string(), page, page_size));
            if query.trim().is_empty() {
                return SearchPage::empty();
            }
            self.page.clone()
        }
    }

    struct FakeEnricher(Option<BookDetails>);

    #[async_trait]
    impl MetadataSource for FakeEnricher {
        async fn get_details(&self, _title: &str, _author: &str) -> Option<BookDetails> {
            self.0.clone()
        }
    }

    fn dune_details() -> BookDetails {
        BookDetails {
            title: Some("Dune".to_string()),
            authors: vec!["Frank Herbert".to_string()],
            description: Some("Desert planet.".to_string()),
            region: Some("Middle East".to_string()),
            subjects: vec!["Science Fiction".to_string()],
            is_fiction: Some(Classification::Fiction),
        }
    }

    struct Harness {
        app: Router,
        store: BookStore,
        catalog: Arc<FakeCatalog>,
    }

    async fn harness(details: Option<BookDetails>) -> Harness {
        let store = test_store().await;
        let catalog = Arc::new(FakeCatalog {
            page: SearchPage {
                hits: vec![SearchHit {
                    title: "Good Omens".to_string(),
                    authors: vec!["Terry Pratchett".to_string(), "Neil Gaiman".to_string()],
                    key: "vol-1".to_string(),
                    subjects: vec!["Fantasy".to_string()],
                }],
                total: 1,
            },
            ..FakeCatalog::default()
        });
        let state = BooksState {
            store: store.clone(),
            catalog: catalog.clone(),
            enricher: Arc::new(FakeEnricher(details)),
            admin: AdminGate::new(Some(SECRET)),
            search_page_size: 20,
        };
        Harness {
            app: router().with_state(state),
            store,
            catalog,
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value, admin: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(password) = admin {
            builder = builder.header("X-Admin-Password", password);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn selection(title: &str, is_owned: bool) -> Value {
        json!({
            "book_key": "vol-1",
            "title": title,
            "authors_str": "Frank Herbert",
            "subjects": ["Classics"],
            "is_owned": is_owned
        })
    }

    async fn seed(store: &BookStore, title: &str) -> i64 {
        match store
            .add(&NewBook {
                title: title.to_string(),
                author: "Someone".to_string(),
                ..NewBook::default()
            })
            .await
            .unwrap()
        {
            super::super::store::AddOutcome::Added { id } => id,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn search_joins_authors_and_defaults_page() {
        let h = harness(None).await;

        let (status, body) = send(&h.app, get("/search?q=omens")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!([{
                "title": "Good Omens",
                "authors": "Terry Pratchett, Neil Gaiman",
                "key": "vol-1",
                "subjects": ["Fantasy"]
            }])
        );

        let (_, _) = send(&h.app, get("/search?q=omens&page=0")).await;
        let calls = h.catalog.calls.lock().unwrap().clone();
        assert_eq!(calls[0], ("omens".to_string(), 1, 20));
        assert_eq!(calls[1], ("omens".to_string(), 1, 20));
    }

    #[tokio::test]
    async fn search_without_query_is_empty() {
        let h = harness(None).await;
        let (status, body) = send(&h.app, get("/search")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn add_merges_enrichment_and_is_idempotent() {
        let h = harness(Some(dune_details())).await;

        let (status, body) = send(
            &h.app,
            json_request("POST", "/add", selection("dune", false), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"status": "success", "message": "Added to the To-Read List"})
        );

        let (status, body) = send(
            &h.app,
            json_request("POST", "/add", selection("dune", false), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Book 'Dune' already exists.");
        assert_eq!(h.store.count().await.unwrap(), 1);

        let stored = &h.store.list(0, 1).await.unwrap()[0];
        assert_eq!(stored.title, "Dune");
        assert_eq!(stored.author, "Frank Herbert");
        assert_eq!(stored.subjects, vec!["Science Fiction"]);
        assert_eq!(stored.region.as_deref(), Some("Middle East"));
    }

    #[tokio::test]
    async fn add_downgrades_ownership_without_admin() {
        let h = harness(Some(dune_details())).await;
        send(
            &h.app,
            json_request("POST", "/add", selection("Dune", true), Some("wrong")),
        )
        .await;
        assert!(!h.store.list(0, 1).await.unwrap()[0].is_owned);

        let h = harness(Some(dune_details())).await;
        send(
            &h.app,
            json_request("POST", "/add", selection("Dune", true), Some(SECRET)),
        )
        .await;
        assert!(h.store.list(0, 1).await.unwrap()[0].is_owned);
    }

    #[tokio::test]
    async fn add_falls_back_to_selection_fields() {
        let sparse = BookDetails {
            description: Some("Only a description".to_string()),
            ..BookDetails::default()
        };
        let h = harness(Some(sparse)).await;

        let (status, _) = send(
            &h.app,
            json_request("POST", "/add", selection("Children of Dune", false), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let stored = &h.store.list(0, 1).await.unwrap()[0];
        assert_eq!(stored.title, "Children of Dune");
        assert_eq!(stored.author, "Frank Herbert");
        assert_eq!(stored.subjects, vec!["Classics"]);
        assert_eq!(stored.is_fiction, None);
    }

    #[tokio::test]
    async fn add_without_details_is_not_found() {
        let h = harness(None).await;
        let (status, body) = send(
            &h.app,
            json_request("POST", "/add", selection("Dune", false), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["message"], "Could not fetch book details.");
        assert_eq!(h.store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn patch_checks_admin_then_body_then_id() {
        let h = harness(None).await;
        let id = seed(&h.store, "Emma").await;
        let uri = format!("/books/{id}");

        let (status, _) = send(
            &h.app,
            json_request("PATCH", &uri, json!({"is_owned": true}), None),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&h.app, json_request("PATCH", &uri, json!({}), Some(SECRET))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &h.app,
            json_request("PATCH", "/books/9999", json!({"is_owned": true}), Some(SECRET)),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &h.app,
            json_request("PATCH", &uri, json!({"is_owned": true}), Some(SECRET)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert!(h.store.list(0, 1).await.unwrap()[0].is_owned);
    }

    #[tokio::test]
    async fn delete_requires_admin_and_existing_id() {
        let h = harness(None).await;
        let id = seed(&h.store, "Persuasion").await;
        let delete = |uri: String, admin: Option<&str>| {
            let mut builder = Request::builder().method("DELETE").uri(uri);
            if let Some(password) = admin {
                builder = builder.header("x-admin-password", password);
            }
            builder.body(Body::empty()).unwrap()
        };

        let (status, body) = send(&h.app, delete(format!("/books/{id}"), Some("nope"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["message"], "Invalid admin password");

        let (status, _) = send(&h.app, delete(format!("/books/{}", id + 1), Some(SECRET))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&h.app, delete(format!("/books/{id}"), Some(SECRET))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(h.store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn wishlist_pages_newest_first() {
        let h = harness(None).await;
        for i in 1..=5 {
            seed(&h.store, &format!("Book {i}")).await;
        }

        let (status, body) = send(&h.app, get("/wishlist?page=2&size=2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 5);
        assert_eq!(body["page"], 2);
        assert_eq!(body["size"], 2);
        assert_eq!(body["total_pages"], 3);
        let titles: Vec<&str> = body["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["Book 3", "Book 2"]);
        assert_eq!(body["items"][0]["is_fiction"], "Unknown");
        assert_eq!(body["items"][0]["subjects"], json!([]));

        let (_, body) = send(&h.app, get("/toread")).await;
        assert_eq!(body["size"], 12);
        assert_eq!(body["total_pages"], 1);
        assert_eq!(body["items"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn wishlist_accepts_the_largest_page_size() {
        let h = harness(None).await;
        seed(&h.store, "First").await;
        seed(&h.store, "Second").await;

        let (status, body) = send(&h.app, get(&format!("/wishlist?size={}", i64::MAX))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["total_pages"], 1);
        assert_eq!(body["items"].as_array().unwrap().len(), 2);

        let (status, body) = send(
            &h.app,
            get(&format!("/wishlist?page={}&size={}", i64::MAX, i64::MAX)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["items"], json!([]));
    }

    #[tokio::test]
    async fn wishlist_rejects_non_positive_paging() {
        let h = harness(None).await;
        let (status, body) = send(&h.app, get("/wishlist?page=0")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["details"][0]["field"], "page");
        let (status, _) = send(&h.app, get("/toread?size=0")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn empty_wishlist_has_zero_pages() {
        let h = harness(None).await;
        let (_, body) = send(&h.app, get("/wishlist")).await;
        assert_eq!(body["total"], 0);
        assert_eq!(body["total_pages"], 0);
    }

    #[tokio::test]
    async fn stats_report_over_http() {
        let h = harness(None).await;
        seed(&h.store, "Solo").await;

        let (status, body) = send(&h.app, get("/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_books"], 1);
        assert_eq!(body["regions"]["Unknown"][0]["title"], "Solo");
        assert_eq!(body["categories"]["Uncategorized"][0]["author"], "Someone");
    }

    #[tokio::test]
    async fn verify_admin_checks_the_header() {
        let h = harness(None).await;
        let request = |admin: Option<&str>| {
            let mut builder = Request::builder().method("POST").uri("/verify-admin");
            if let Some(password) = admin {
                builder = builder.header("X-Admin-Password", password);
            }
            builder.body(Body::empty()).unwrap()
        };

        let (status, body) = send(&h.app, request(Some(SECRET))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));

        let (status, _) = send(&h.app, request(None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
