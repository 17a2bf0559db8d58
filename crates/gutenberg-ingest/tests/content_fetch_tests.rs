//! Content fetcher tests against a mock text server

mod common;

use common::gutenberg_text;
use gutenberg_ingest::content::{ContentFetcher, ContentSource};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_fetch_strips_boilerplate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ebooks/11.txt.utf-8"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(gutenberg_text("Alice in Wonderland", "Down the Rabbit-Hole")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = ContentFetcher::new(reqwest::Client::new());
    let url = format!("{}/ebooks/11.txt.utf-8", server.uri());

    let content = fetcher
        .fetch_and_clean(Some(&url), "Alice in Wonderland")
        .await;

    assert_eq!(content.as_deref(), Some("Down the Rabbit-Hole"));
}

#[tokio::test]
async fn test_text_without_markers_is_kept_whole() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("plain text, no header"))
        .mount(&server)
        .await;

    let fetcher = ContentFetcher::new(reqwest::Client::new());
    let url = format!("{}/ebooks/5.txt", server.uri());

    let content = fetcher.fetch_and_clean(Some(&url), "Anything").await;
    assert_eq!(content.as_deref(), Some("plain text, no header"));
}

#[tokio::test]
async fn test_not_found_yields_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = ContentFetcher::new(reqwest::Client::new());
    let url = format!("{}/ebooks/404.txt", server.uri());

    assert!(fetcher.fetch_and_clean(Some(&url), "Missing").await.is_none());
}

#[tokio::test]
async fn test_server_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = ContentFetcher::new(reqwest::Client::new());
    let url = format!("{}/ebooks/1.txt", server.uri());

    assert!(fetcher.fetch_and_clean(Some(&url), "Busy").await.is_none());
}

#[tokio::test]
async fn test_missing_url_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let fetcher = ContentFetcher::new(reqwest::Client::new());
    assert!(fetcher.fetch_and_clean(None, "No Text Edition").await.is_none());
}

#[tokio::test]
async fn test_unreachable_host_yields_none() {
    let fetcher = ContentFetcher::new(reqwest::Client::new());
    // port 9 (discard) on localhost is not expected to accept HTTP
    let content = fetcher
        .fetch_and_clean(Some("http://127.0.0.1:9/ebooks/1.txt"), "Nowhere")
        .await;
    assert!(content.is_none());
}
