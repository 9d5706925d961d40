//! ApiClient against an in-process axum backend.

use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use wikivoice_core::types::{ApiFlavor, SearchKind};
use wikivoice_lib::api::search_all;
use wikivoice_lib::{ApiClient, ApiConfig, ApiError, Backend};

#[derive(Clone, Default)]
struct Seen {
    searches: Arc<Mutex<Vec<(String, Value)>>>,
}

async fn search(
    State(seen): State<Seen>,
    Path(kind): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    seen.searches.lock().unwrap().push((kind.clone(), body));
    match kind.as_str() {
        "title" | "content" => Ok(Json(json!({
            "status": "success",
            "results": [
                {"article_id": 1, "title": format!("{kind} one"), "text": "first"},
                {"article_id": 2, "title": format!("{kind} two"), "text": "second"},
            ]
        }))),
        "lexical" => Ok(Json(json!({
            "status": "success",
            "results": [{"article_id": 3, "title": "Lexical", "text": "third"}]
        }))),
        "semantic" => Ok(Json(json!({"status": "error", "message": "index offline"}))),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

#[derive(serde::Deserialize)]
struct ArticleQuery {
    id: u64,
}

async fn article(Query(q): Query<ArticleQuery>) -> Result<Json<Value>, StatusCode> {
    match q.id {
        1 => Ok(Json(json!({
            "status": "success",
            "article": {
                "title": "Rome",
                "sections": [
                    {"title": "Intro", "texts": ["Rome is a city.", "It is old."]},
                    {"title": "History", "content": "Founded in 753 BC."},
                    {"title": "See also", "texts": []},
                ]
            }
        }))),
        2 => Ok(Json(json!({"status": "error", "message": "not found"}))),
        3 => Ok(Json(json!({"status": "success"}))),
        _ => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

async fn serve() -> (String, Seen) {
    let seen = Seen::default();
    let app = Router::new()
        .route("/api/search/{kind}", post(search))
        .route("/api/article", get(article))
        .with_state(seen.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), seen)
}

fn client(base_url: String, flavor: ApiFlavor) -> ApiClient {
    ApiClient::new(ApiConfig {
        base_url,
        timeout_ms: 2_000,
        flavor,
    })
    .unwrap()
}

#[tokio::test]
async fn search_posts_query_and_limit() {
    let (url, seen) = serve().await;
    let api = client(url, ApiFlavor::Current);

    let results = api.search(SearchKind::Title, "rome", 5).await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].id, 1);
    assert_eq!(results[0].title, "title one");
    assert_eq!(results[0].snippet, "first");

    let searches = seen.searches.lock().unwrap();
    assert_eq!(searches[0].0, "title");
    assert_eq!(searches[0].1, json!({"query": "rome", "limit": 5}));
}

#[tokio::test]
async fn backend_error_status_yields_empty_results() {
    let (url, _) = serve().await;
    let api = client(url, ApiFlavor::Current);

    assert!(api.search(SearchKind::Semantic, "rome", 5).await.is_empty());
    assert!(matches!(
        api.try_search(SearchKind::Semantic, "rome", 5).await,
        Err(ApiError::Backend { .. })
    ));
}

#[tokio::test]
async fn unreachable_backend_yields_empty_results() {
    // Grab a free port, then close it so nothing is listening.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let api = client(format!("http://{addr}"), ApiFlavor::Current);
    assert!(api.search(SearchKind::Title, "rome", 5).await.is_empty());
}

#[tokio::test]
async fn legacy_flavor_uses_old_endpoint_names() {
    let (url, seen) = serve().await;
    let api = client(url, ApiFlavor::Legacy);

    let results = api.search(SearchKind::Lexical, "rome", 5).await;
    assert_eq!(results[0].title, "content one");
    assert_eq!(seen.searches.lock().unwrap()[0].0, "content");
}

#[tokio::test]
async fn search_all_concatenates_in_kind_order() {
    let (url, _) = serve().await;
    let api = client(url, ApiFlavor::Current);

    let kinds = [SearchKind::Lexical, SearchKind::Semantic, SearchKind::Title];
    let titles: Vec<String> = search_all(&api, &kinds, "rome", 5)
        .await
        .into_iter()
        .map(|r| r.title)
        .collect();
    assert_eq!(titles, vec!["Lexical", "title one", "title two"]);
}

#[tokio::test]
async fn article_accepts_texts_and_legacy_content() {
    let (url, _) = serve().await;
    let api = client(url, ApiFlavor::Current);

    let article = api.article(1).await.unwrap();
    assert_eq!(article.title, "Rome");
    assert_eq!(article.sections.len(), 3);
    assert_eq!(article.sections[0].texts, vec!["Rome is a city.", "It is old."]);
    assert_eq!(article.sections[1].texts, vec!["Founded in 753 BC."]);
    assert!(article.sections[2].texts.is_empty());
}

#[tokio::test]
async fn article_failures_are_errors() {
    let (url, _) = serve().await;
    let api = client(url, ApiFlavor::Current);

    assert!(matches!(api.article(2).await, Err(ApiError::Backend { .. })));
    assert!(matches!(api.article(3).await, Err(ApiError::MissingArticle)));
    assert!(matches!(api.article(99).await, Err(ApiError::Http(_))));
}
