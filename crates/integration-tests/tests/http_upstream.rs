//! HTTP Upstream Tests
//!
//! `UpstreamClient` + `HttpFetcher` against a scripted local HTTP responder:
//! status mapping, Retry-After handling and queue retries over real sockets.

use anifetch_core::domain::{QueueConfig, RequestError};
use anifetch_core::port::time_provider::mocks::FixedTimeProvider;
use anifetch_core::port::time_provider::SystemTimeProvider;
use anifetch_core::port::TimeProvider;
use anifetch_infra_http::{FetcherConfig, HttpFetcher, Upstream, UpstreamClient};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Never answer; used to trigger client timeouts
const HANG: &str = "";

type Requests = Arc<Mutex<Vec<String>>>;

fn reply(status: &str, headers: &[(&str, &str)], body: &str) -> String {
    let mut response = format!("HTTP/1.1 {}\r\n", status);
    for (name, value) in headers {
        response.push_str(&format!("{}: {}\r\n", name, value));
    }
    response.push_str(&format!(
        "content-length: {}\r\nconnection: close\r\n\r\n{}",
        body.len(),
        body
    ));
    response
}

fn json_reply(body: &str) -> String {
    reply("200 OK", &[("content-type", "application/json")], body)
}

/// Read one request (headers plus `content-length` body)
async fn read_request(socket: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 1024];

    loop {
        let n = socket.read(&mut buf).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);

        let text = String::from_utf8_lossy(&data);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if data.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }

    String::from_utf8_lossy(&data).into_owned()
}

/// Serve `script` in order, one response per connection; the last one repeats
async fn spawn_responder(script: Vec<String>) -> (String, Requests) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests: Requests = Arc::new(Mutex::new(Vec::new()));
    let script = Arc::new(Mutex::new(VecDeque::from(script)));

    let recorded = requests.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let recorded = recorded.clone();
            let script = script.clone();

            tokio::spawn(async move {
                let request = read_request(&mut socket).await;
                recorded.lock().unwrap().push(request);

                let response = {
                    let mut script = script.lock().unwrap();
                    if script.len() > 1 {
                        script.pop_front().unwrap_or_default()
                    } else {
                        script.front().cloned().unwrap_or_default()
                    }
                };

                if response == HANG {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    return;
                }
                socket.write_all(response.as_bytes()).await.ok();
                socket.shutdown().await.ok();
            });
        }
    });

    (format!("http://{}", addr), requests)
}

fn client_with(
    base_url: &str,
    max_retries: u32,
    fetcher_config: FetcherConfig,
    clock: Arc<dyn TimeProvider>,
) -> UpstreamClient {
    let fetcher = Arc::new(HttpFetcher::new(&fetcher_config, clock).unwrap());
    let config = QueueConfig::new("jikan", Duration::from_millis(10), max_retries);
    UpstreamClient::new(Upstream::Jikan, config, fetcher)
        .unwrap()
        .with_base_url(base_url)
}

fn client(base_url: &str, max_retries: u32) -> UpstreamClient {
    client_with(
        base_url,
        max_retries,
        FetcherConfig::default(),
        Arc::new(SystemTimeProvider),
    )
}

#[tokio::test]
async fn test_success_returns_json_body() {
    let (base_url, requests) = spawn_responder(vec![json_reply(r#"{"data":{"name":"Emilia"}}"#)]).await;
    let client = client(&base_url, 3);

    let body = client.get_json("/characters/118763").await.unwrap();

    assert_eq!(body["data"]["name"], "Emilia");
    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].starts_with("GET /characters/118763 HTTP/1.1"));
    assert!(requests[0].to_ascii_lowercase().contains("user-agent: anifetch/"));
}

#[tokio::test]
async fn test_retry_after_ms_header_is_honoured() {
    let (base_url, requests) = spawn_responder(vec![
        reply("429 Too Many Requests", &[("retry-after-ms", "150")], "slow down"),
        json_reply(r#"{"ok":true}"#),
    ])
    .await;
    let client = client(&base_url, 3);

    let started = Instant::now();
    let body = client.get_json("/anime/1").await.unwrap();

    assert_eq!(body["ok"], true);
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(requests.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_http_date_retry_after_uses_time_provider() {
    // Retry-After date is 5s ahead of the mock clock, which then moves 4.8s
    let clock = Arc::new(FixedTimeProvider::new(1_445_412_480_000 - 5_000));
    clock.advance(4_800);

    let (base_url, requests) = spawn_responder(vec![
        reply(
            "429 Too Many Requests",
            &[("retry-after", "Wed, 21 Oct 2015 07:28:00 GMT")],
            "",
        ),
        json_reply(r#"{"ok":true}"#),
    ])
    .await;
    let client = client_with(&base_url, 3, FetcherConfig::default(), clock);

    let started = Instant::now();
    client.get_json("/anime/1").await.unwrap();

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_secs(2), "hint should win over the 2s default");
    assert_eq!(requests.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_server_error_retried_then_rejected() {
    let (base_url, requests) =
        spawn_responder(vec![reply("503 Service Unavailable", &[], "upstream down")]).await;
    let client = client(&base_url, 1);

    let err = client.get_json("/anime/1").await.unwrap_err();

    match &err {
        RequestError::Status {
            status, message, ..
        } => {
            assert_eq!(*status, 503);
            assert_eq!(message, "upstream down");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(requests.lock().unwrap().len(), 2, "initial attempt + 1 retry");
}

#[tokio::test]
async fn test_not_found_is_permanent() {
    let (base_url, requests) = spawn_responder(vec![reply("404 Not Found", &[], "")]).await;
    let client = client(&base_url, 3);

    let err = client.get_json("/characters/0").await.unwrap_err();

    assert_eq!(err.status_code(), Some(404));
    assert_eq!(err.to_string(), "HTTP 404: Not Found");
    assert_eq!(requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_graphql_post_sends_json_body() {
    let (base_url, requests) =
        spawn_responder(vec![json_reply(r#"{"data":{"Character":{"id":88}}}"#)]).await;
    let client = client(&base_url, 3);

    let query = "query ($id: Int) { Character(id: $id) { id } }";
    let body = client
        .post_json("", json!({ "query": query, "variables": { "id": 88 } }))
        .await
        .unwrap();

    assert_eq!(body["data"]["Character"]["id"], 88);
    let requests = requests.lock().unwrap();
    assert!(requests[0].starts_with("POST / HTTP/1.1"));
    assert!(requests[0].contains(r#""variables":{"id":88}"#));
}

#[tokio::test]
async fn test_invalid_json_is_decode_error() {
    let (base_url, _) = spawn_responder(vec![reply(
        "200 OK",
        &[("content-type", "text/html")],
        "<html>maintenance</html>",
    )])
    .await;
    let client = client(&base_url, 3);

    let err = client.get_json("/anime/1").await.unwrap_err();
    assert!(matches!(err, RequestError::Decode(_)), "got {err}");
}

#[tokio::test]
async fn test_timeout_is_transport_error() {
    let (base_url, requests) = spawn_responder(vec![HANG.to_string()]).await;
    let config = FetcherConfig {
        timeout: Duration::from_millis(200),
        ..FetcherConfig::default()
    };
    let client = client_with(&base_url, 3, config, Arc::new(SystemTimeProvider));

    let err = client.get_json("/anime/1").await.unwrap_err();

    match err {
        RequestError::Transport { code, .. } => assert_eq!(code.as_deref(), Some("TIMEOUT")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(requests.lock().unwrap().len(), 1, "timeouts are not retried");
}

#[tokio::test]
async fn test_get_bytes_returns_raw_body() {
    let (base_url, _) = spawn_responder(vec![reply(
        "200 OK",
        &[("content-type", "image/gif")],
        "GIF89a",
    )])
    .await;
    let fetcher = HttpFetcher::new(&FetcherConfig::default(), Arc::new(SystemTimeProvider)).unwrap();

    let bytes = fetcher
        .get_bytes(&format!("{}/neko/0001.gif", base_url))
        .await
        .unwrap();
    assert_eq!(bytes, b"GIF89a");
}

#[tokio::test]
async fn test_submissions_share_one_queue() {
    let (base_url, requests) = spawn_responder(vec![json_reply(r#"{"ok":true}"#)]).await;
    let client = client(&base_url, 3);

    let pending: Vec<_> = (1..=5)
        .map(|id| client.get_json(&format!("/characters/{}", id)))
        .collect();
    for result in futures::future::join_all(pending).await {
        result.unwrap();
    }

    let requests = requests.lock().unwrap();
    let paths: Vec<_> = requests
        .iter()
        .filter_map(|r| r.split_whitespace().nth(1))
        .collect();
    assert_eq!(
        paths,
        vec![
            "/characters/1",
            "/characters/2",
            "/characters/3",
            "/characters/4",
            "/characters/5"
        ]
    );
}
