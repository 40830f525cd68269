//! Integration tests using wiremock to simulate HTTP servers.
//!
//! The client is blocking, so every test owns a multi-threaded tokio runtime
//! that hosts the mock server while the client runs on the test thread.

use restbind::rate_limit::FixedWindowRateLimiter;
use restbind::{
    record, Argument, CancelToken, Client, Contract, Error, MethodDescriptor, Reply, ReturnShape,
    Service, ServiceHandler,
};
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use wiremock::matchers::{body_bytes, body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Default, Clone, PartialEq)]
struct User {
    id: u32,
    name: String,
    email: Option<String>,
}

record! {
    User { id, name, email }
}

struct Users(Arc<ServiceHandler>);

impl Service for Users {
    fn contract() -> Contract {
        Contract::builder("Users")
            .method(
                "find",
                MethodDescriptor::get("/users/{id}")
                    .path_param("id")
                    .returns(ReturnShape::typed::<User>()),
            )
            .method(
                "create",
                MethodDescriptor::post("/users")
                    .body_param()
                    .returns(ReturnShape::typed::<User>()),
            )
            .method(
                "search",
                MethodDescriptor::get("/users")
                    .query_param("a")
                    .query_param("b")
                    .query_param("c")
                    .returns(ReturnShape::typed::<Vec<User>>()),
            )
            .method(
                "note",
                MethodDescriptor::post("/notes")
                    .body_param()
                    .header("Content-Type: text/plain")
                    .returns(ReturnShape::Text),
            )
            .method(
                "upload",
                MethodDescriptor::put("/files/{name}")
                    .path_param("name")
                    .body_param()
                    .returns(ReturnShape::Void),
            )
            .method("text", MethodDescriptor::get("/text").returns(ReturnShape::Text))
            .method("raw", MethodDescriptor::get("/raw").returns(ReturnShape::Bytes))
            .method("stream", MethodDescriptor::get("/raw").returns(ReturnShape::Stream))
            .method("ping", MethodDescriptor::delete("/ping"))
            .build()
    }

    fn bind(handler: Arc<ServiceHandler>) -> Self {
        Users(handler)
    }
}

impl Users {
    fn find(&self, id: u32) -> restbind::Result<User> {
        self.0.call("find", vec![Argument::of(&id)])
    }

    fn create(&self, user: &User) -> restbind::Result<User> {
        self.0.call("create", vec![Argument::of(user)])
    }

    fn text(&self) -> restbind::Result<String> {
        self.0.invoke("text", vec![])?.into_text()
    }
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

fn mount(rt: &Runtime, server: &MockServer, mock: Mock) {
    rt.block_on(mock.mount(server));
}

fn request_count(rt: &Runtime, server: &MockServer) -> usize {
    rt.block_on(server.received_requests())
        .map(|requests| requests.len())
        .unwrap_or(0)
}

fn client_for(server: &MockServer) -> restbind::ClientBuilder {
    Client::builder().base_url(server.uri()).unwrap()
}

#[test]
fn test_typed_get_request() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/users/7"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"id":7,"name":"Ana","email":null,"roles":["admin",{"x":1}]}"#,
                "application/json",
            )),
    );

    let client = client_for(&server).build().unwrap();
    let user = client.service::<Users>().find(7).unwrap();

    assert_eq!(
        user,
        User {
            id: 7,
            name: "Ana".to_string(),
            email: None,
        }
    );
}

#[test]
fn test_post_sends_encoded_body_with_content_type() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    mount(
        &rt,
        &server,
        Mock::given(method("POST"))
            .and(path("/users"))
            .and(header("content-type", "application/json"))
            .and(body_string(r#"{"id":0,"name":"Bob"}"#))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_raw(r#"{"id":12,"name":"Bob"}"#, "application/json"),
            ),
    );

    let client = client_for(&server).build().unwrap();
    let created = client
        .service::<Users>()
        .create(&User {
            name: "Bob".to_string(),
            ..Default::default()
        })
        .unwrap();

    assert_eq!(created.id, 12);
}

#[test]
fn test_retry_makes_all_attempts_with_backoff() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/text"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy")),
    );

    let client = client_for(&server).max_retries(2).build().unwrap();
    let start = Instant::now();
    let err = client.service::<Users>().text().unwrap_err();

    assert!(start.elapsed() >= Duration::from_millis(300));
    assert_eq!(request_count(&rt, &server), 3);
    assert_eq!(err.status().map(|s| s.as_u16()), Some(503));
    assert_eq!(err.raw_response(), Some("busy"));
    match err {
        Error::MaxRetriesExceeded { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected MaxRetriesExceeded, got {other:?}"),
    }
}

#[test]
fn test_retry_recovers_after_transient_failure() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/text"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .with_priority(1),
    );
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/text"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok")),
    );

    let client = client_for(&server).max_retries(3).build().unwrap();
    assert_eq!(client.service::<Users>().text().unwrap(), "ok");
    assert_eq!(request_count(&rt, &server), 2);
}

#[test]
fn test_decode_failure_is_retried() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/users/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"id\":\"one\"}")),
    );

    let client = client_for(&server).max_retries(1).build().unwrap();
    let err = client.service::<Users>().find(1).unwrap_err();

    assert_eq!(request_count(&rt, &server), 2);
    assert!(matches!(err.last_error(), Error::FormatError(_)));
}

#[test]
fn test_null_body_for_record_is_retried() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/users/7"))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .up_to_n_times(1)
            .with_priority(1),
    );
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/users/7"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"id":7}"#)),
    );

    let client = client_for(&server).max_retries(2).build().unwrap();
    let user = client.service::<Users>().find(7).unwrap();

    assert_eq!(user.id, 7);
    assert_eq!(request_count(&rt, &server), 2);
}

#[test]
fn test_http_error_carries_interceptor_processed_text() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/text"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_string("missing")
                    .insert_header("Retry-After", "5"),
            ),
    );

    let client = client_for(&server)
        .response_interceptor(Arc::new(|_status: http::StatusCode, body: String| {
            format!("{body} [seen]")
        }))
        .build()
        .unwrap();
    let err = client.service::<Users>().text().unwrap_err();

    match &err {
        Error::HttpError {
            status,
            raw_response,
            rate_limit_info,
            ..
        } => {
            assert_eq!(status.as_u16(), 404);
            assert_eq!(raw_response, "missing [seen]");
            assert_eq!(
                rate_limit_info.as_ref().and_then(|i| i.retry_after),
                Some(Duration::from_secs(5))
            );
        }
        other => panic!("expected HttpError, got {other:?}"),
    }
    assert_eq!(request_count(&rt, &server), 1);
}

#[test]
fn test_interceptors_run_in_registration_order() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/text"))
            .and(header("x-first", "1"))
            .and(header("x-second", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("body")),
    );

    let client = client_for(&server)
        .request_interceptor(Arc::new(|request: &mut reqwest::blocking::Request| {
            request
                .headers_mut()
                .insert("x-first", http::HeaderValue::from_static("1"));
        }))
        .request_interceptor(Arc::new(|request: &mut reqwest::blocking::Request| {
            assert!(request.headers().contains_key("x-first"));
            request
                .headers_mut()
                .insert("x-second", http::HeaderValue::from_static("1"));
        }))
        .response_interceptor(Arc::new(|_status: http::StatusCode, body: String| body + "a"))
        .response_interceptor(Arc::new(|_status: http::StatusCode, body: String| body + "b"))
        .build()
        .unwrap();

    assert_eq!(client.service::<Users>().text().unwrap(), "bodyab");
}

#[test]
fn test_manual_redirects_are_capped() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/text"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/text")),
    );

    let client = client_for(&server)
        .follow_redirects(false)
        .max_retries(2)
        .build()
        .unwrap();
    let err = client.service::<Users>().text().unwrap_err();

    match err {
        Error::RedirectsExhausted { redirects, .. } => assert_eq!(redirects, 5),
        other => panic!("expected RedirectsExhausted, got {other:?}"),
    }
    // One attempt only: redirect exhaustion is not retried.
    assert_eq!(request_count(&rt, &server), 6);
}

#[test]
fn test_manual_redirect_is_followed() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/text"))
            .respond_with(ResponseTemplate::new(301).insert_header("Location", "moved/here")),
    );
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/moved/here"))
            .respond_with(ResponseTemplate::new(200).set_body_string("arrived")),
    );

    let manual = client_for(&server).follow_redirects(false).build().unwrap();
    assert_eq!(manual.service::<Users>().text().unwrap(), "arrived");

    let automatic = client_for(&server).build().unwrap();
    assert_eq!(automatic.service::<Users>().text().unwrap(), "arrived");
}

#[test]
fn test_raw_bytes_are_returned_for_error_status() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/raw"))
            .respond_with(ResponseTemplate::new(500).set_body_bytes(vec![0u8, 1, 2, 255])),
    );

    let client = client_for(&server)
        .response_interceptor(Arc::new(|_status: http::StatusCode, _body: String| -> String {
            panic!("text interceptors must not see raw bodies")
        }))
        .build()
        .unwrap();
    let users = client.service::<Users>();

    let bytes = users.0.invoke("raw", vec![]).unwrap().into_bytes().unwrap();
    assert_eq!(bytes, vec![0, 1, 2, 255]);

    let streamed = users.0.invoke("stream", vec![]).unwrap();
    assert!(matches!(streamed, Reply::Stream(_)));
    assert_eq!(streamed.into_bytes().unwrap(), vec![0, 1, 2, 255]);
}

#[test]
fn test_void_method_ignores_status() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    mount(
        &rt,
        &server,
        Mock::given(method("DELETE"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(500)),
    );

    let client = client_for(&server).max_retries(3).build().unwrap();
    let reply = client.service::<Users>().0.invoke("ping", vec![]).unwrap();

    assert!(reply.is_empty());
    assert_eq!(request_count(&rt, &server), 1);
}

#[test]
fn test_charset_from_content_type() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/text"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                vec![0x63u8, 0x61, 0x66, 0xE9],
                "text/plain; charset=iso-8859-1",
            )),
    );

    let client = client_for(&server).build().unwrap();
    assert_eq!(client.service::<Users>().text().unwrap(), "café");
}

#[test]
fn test_static_header_overrides_content_type_guess() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    mount(
        &rt,
        &server,
        Mock::given(method("POST"))
            .and(path("/notes"))
            .and(header("content-type", "text/plain"))
            .and(body_string("\"remember\""))
            .respond_with(ResponseTemplate::new(200).set_body_string("saved")),
    );

    let client = client_for(&server).build().unwrap();
    let reply = client
        .service::<Users>()
        .0
        .invoke("note", vec![Argument::from("remember")])
        .unwrap();
    assert_eq!(reply.into_text().unwrap(), "saved");
}

#[test]
fn test_empty_and_null_query_params_are_omitted() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/users"))
            .and(query_param("c", "5"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(r#"[{"id":1,"name":"x"}]"#, "application/json"),
            ),
    );

    let client = client_for(&server).build().unwrap();
    let users: Vec<User> = client
        .service::<Users>()
        .0
        .call(
            "search",
            vec![Argument::from(""), Argument::from("null"), Argument::of(&5u8)],
        )
        .unwrap();
    assert_eq!(users.len(), 1);

    let requests = rt.block_on(server.received_requests()).unwrap();
    assert_eq!(requests[0].url.query(), Some("c=5"));
}

#[test]
fn test_stream_body_upload() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
    mount(
        &rt,
        &server,
        Mock::given(method("PUT"))
            .and(path("/files/blob.bin"))
            .and(header("content-type", "application/octet-stream"))
            .and(body_bytes(payload.clone()))
            .respond_with(ResponseTemplate::new(204)),
    );

    let client = client_for(&server).build().unwrap();
    let reply = client
        .service::<Users>()
        .0
        .invoke(
            "upload",
            vec![
                Argument::from("blob.bin"),
                Argument::stream(Cursor::new(payload)),
            ],
        )
        .unwrap();
    assert!(reply.is_empty());
    assert_eq!(request_count(&rt, &server), 1);
}

#[test]
fn test_read_timeout() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/text"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_millis(500)),
            ),
    );

    let client = client_for(&server)
        .read_timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    let err = client.service::<Users>().text().unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "got {err:?}");
}

#[test]
fn test_rate_limiter_delays_third_call() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/text"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok")),
    );

    let window = Duration::from_millis(400);
    let start = Instant::now();
    let limiter = FixedWindowRateLimiter::with_window(2, window).unwrap();
    let client = client_for(&server)
        .rate_limiter(Arc::new(limiter))
        .build()
        .unwrap();
    let users = client.service::<Users>();

    users.text().unwrap();
    users.text().unwrap();
    assert!(start.elapsed() < window);
    users.text().unwrap();
    assert!(start.elapsed() >= window);
}

#[test]
fn test_cancel_interrupts_backoff() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/text"))
            .respond_with(ResponseTemplate::new(503)),
    );

    let cancel = CancelToken::new();
    let client = client_for(&server)
        .retry_strategy(restbind::RetryStrategy::Fixed {
            delay: Duration::from_secs(30),
            max_retries: 3,
        })
        .cancel_token(cancel.clone())
        .build()
        .unwrap();

    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(200));
        cancel.cancel();
    });
    let start = Instant::now();
    let err = client.service::<Users>().text().unwrap_err();
    canceller.join().unwrap();

    assert!(matches!(err, Error::Interrupted(_)), "got {err:?}");
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[test]
fn test_per_call_cancel_leaves_client_usable() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/text"))
            .respond_with(ResponseTemplate::new(503)),
    );
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/raw"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec())),
    );

    let client = client_for(&server)
        .retry_strategy(restbind::RetryStrategy::Fixed {
            delay: Duration::from_secs(30),
            max_retries: 3,
        })
        .build()
        .unwrap();
    let users = client.service::<Users>();

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(200));
        trigger.cancel();
    });
    let err = users
        .0
        .invoke_with_cancel("text", vec![], &cancel)
        .unwrap_err();
    canceller.join().unwrap();
    assert!(matches!(err, Error::Interrupted(_)), "got {err:?}");

    let bytes = users.0.invoke("raw", vec![]).unwrap().into_bytes().unwrap();
    assert_eq!(bytes, b"ok".to_vec());
}

#[test]
fn test_concurrent_callers_share_one_handler() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/text"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok")),
    );

    let client = client_for(&server).build().unwrap();
    let results: Vec<_> = (0..4)
        .map(|_| {
            let client = client.clone();
            std::thread::spawn(move || {
                let handler = client.create::<Users>();
                let text = Users(Arc::clone(&handler)).text().unwrap();
                (handler, text)
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect();

    assert!(results.iter().all(|(h, _)| Arc::ptr_eq(h, &results[0].0)));
    assert!(results.iter().all(|(_, text)| text == "ok"));
}
