//! HTTP server for receiving webhook notifications.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Buf;
use futures::{Stream, StreamExt};
use hook_parser::{parse_notification, Notification};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;
use warp::http::header::{HeaderValue, AUTHORIZATION, WWW_AUTHENTICATE};
use warp::http::{HeaderMap, Method, StatusCode};
use warp::path::FullPath;
use warp::reply::Response;
use warp::{Filter, Reply as _};

use crate::auth::CredentialChecker;
use crate::body::BodyAccumulator;
use crate::config::HookConfig;
use crate::dispatcher::{Delivery, EventDispatcher};
use crate::error::HookError;
use crate::response::Reply;

/// A webhook receiver that has not started listening yet.
///
/// Subscriptions are registered on the hook before [`listen`](Self::listen);
/// listening consumes the hook, so the set of handlers is fixed while requests
/// are being served.
///
/// # Example
///
/// ```no_run
/// use hook_server::{HookConfig, RecurlyHook};
///
/// #[tokio::main]
/// async fn main() -> Result<(), hook_server::HookError> {
///     let config = HookConfig::new().with_credentials("user", "pass");
///     let mut hook = RecurlyHook::new(config);
///
///     hook.on("new_account_notification", |data| {
///         println!("new account: {}", data["new_account_notification"]["account"]);
///     })
///     .on_any(|name, _data| println!("received {name}"))
///     .on_error(|error, reply| eprintln!("rejected webhook ({}): {error}", reply.message));
///
///     let server = hook.listen().await?;
///     println!("listening on {}", server.local_addr());
///     server.wait().await;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct RecurlyHook {
    config: HookConfig,
    dispatcher: EventDispatcher,
}

impl RecurlyHook {
    pub fn new(config: HookConfig) -> Self {
        let dispatcher = EventDispatcher::new(config.namespace.clone());
        Self { config, dispatcher }
    }

    pub fn config(&self) -> &HookConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Register a handler under a full dispatch key such as `Recurly.*`.
    pub fn subscribe<F>(&mut self, key: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(Delivery<'_>) + Send + Sync + 'static,
    {
        self.dispatcher.subscribe(key, handler);
        self
    }

    /// Handle one event, named without the namespace.
    pub fn on<F>(&mut self, name: &str, handler: F) -> &mut Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.dispatcher.on(name, handler);
        self
    }

    /// Handle every successfully parsed event.
    pub fn on_any<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        self.dispatcher.on_any(handler);
        self
    }

    /// Handle every rejected request.
    pub fn on_error<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&HookError, &Reply) + Send + Sync + 'static,
    {
        self.dispatcher.on_error(handler);
        self
    }

    /// Bind the configured host and port and start serving.
    pub async fn listen(self) -> Result<HookServer, HookError> {
        self.listen_with(|_| {}).await
    }

    /// Like [`listen`](Self::listen), calling `on_ready` with the bound address
    /// once the listener is up.
    pub async fn listen_with<F>(self, on_ready: F) -> Result<HookServer, HookError>
    where
        F: FnOnce(SocketAddr),
    {
        self.config.validate()?;

        let requested = resolve(&self.config.host, self.config.port).await?;
        let state = Arc::new(HookState::new(self.config, self.dispatcher));
        let routes = routes(state.clone());

        // Create shutdown channel
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let (local_addr, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(requested, async move {
                shutdown_rx.recv().await;
            })
            .map_err(|e| HookError::Bind {
                address: requested.to_string(),
                reason: e.to_string(),
            })?;

        let server_handle = tokio::spawn(server);

        let config = &state.config;
        config.logger.log(&format!(
            "listening for {} events on {}:{}",
            config.namespace,
            config.host,
            local_addr.port()
        ));
        tracing::info!(%local_addr, path = %config.path, "webhook server listening");
        if !state.checker.is_configured() {
            tracing::warn!("no credentials configured, every webhook will be rejected");
        }

        on_ready(local_addr);

        Ok(HookServer {
            local_addr,
            path: config.path.clone(),
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }
}

/// Handle to a listening webhook server.
///
/// Dropping the handle closes the shutdown channel, which also stops the server.
pub struct HookServer {
    local_addr: SocketAddr,
    path: String,
    /// Shutdown signal sender
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl HookServer {
    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `http://<local_addr><path>`, the URL to register with the webhook sender.
    pub fn url(&self) -> String {
        format!("http://{}{}", self.local_addr, self.path)
    }

    /// Stop accepting connections and wait for in-flight requests to finish.
    pub async fn shutdown(mut self) -> Result<(), HookError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }

        if let Some(handle) = self.server_handle.take() {
            handle
                .await
                .map_err(|e| HookError::Shutdown(format!("server task failed: {e}")))?;
        }

        tracing::info!(local_addr = %self.local_addr, "webhook server stopped");
        Ok(())
    }

    /// Serve until the server task ends.
    pub async fn wait(mut self) {
        if let Some(handle) = self.server_handle.take() {
            let _ = handle.await;
        }
    }
}

/// Everything a request needs, shared read-only across requests.
struct HookState {
    config: HookConfig,
    checker: CredentialChecker,
    dispatcher: EventDispatcher,
}

impl HookState {
    fn new(config: HookConfig, dispatcher: EventDispatcher) -> Self {
        let checker = CredentialChecker::new(config.username.as_deref(), config.password.as_deref());
        Self {
            config,
            checker,
            dispatcher,
        }
    }

    /// Publish the failure on the error channel and build its response.
    /// Status actually sent for `error`, honoring the configured auth failure mode.
    fn status_for(&self, error: &HookError) -> StatusCode {
        match error {
            HookError::Unauthorized => self.config.auth_failure.status_code(),
            _ => error.status_code(),
        }
    }

    fn reject(&self, error: HookError) -> Response {
        let status = self.status_for(&error);
        tracing::debug!(%error, status = status.as_u16(), "webhook rejected");
        let reply = Reply::for_status(status);

        self.dispatcher.publish_error(&error, &reply);

        let mut response = json_response(status, &reply);
        if status == StatusCode::UNAUTHORIZED {
            let challenge = HeaderValue::from_str(&format!("Basic realm=\"{}\"", self.config.namespace))
                .unwrap_or_else(|_| HeaderValue::from_static("Basic"));
            response.headers_mut().insert(WWW_AUTHENTICATE, challenge);
        }
        response
    }
}

fn json_response(status: StatusCode, reply: &Reply) -> Response {
    warp::reply::with_status(warp::reply::json(reply), status).into_response()
}

/// Resolve the configured host to a socket address.
async fn resolve(host: &str, port: u16) -> Result<SocketAddr, HookError> {
    let bind_error = |reason: String| HookError::Bind {
        address: format!("{host}:{port}"),
        reason,
    };

    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| bind_error(e.to_string()))?
        .next()
        .ok_or_else(|| bind_error("host resolved to no addresses".to_string()))
}

/// The catch-all filter: every request lands in [`handle_request`], which
/// performs its own path and method validation so that every response,
/// including 404 and 405, carries the JSON body and reaches the error channel.
fn routes(
    state: Arc<HookState>,
) -> impl Filter<Extract = (Response,), Error = warp::Rejection> + Clone + Send + Sync + 'static {
    warp::path::full()
        .and(warp::method())
        .and(warp::header::headers_cloned())
        .and(warp::addr::remote())
        .and(warp::body::stream())
        .and_then(move |path, method, headers, remote, body| {
            let state = state.clone();
            async move {
                Ok::<_, Infallible>(handle_request(state, path, method, headers, remote, body).await)
            }
        })
}

async fn handle_request<S, B>(
    state: Arc<HookState>,
    path: FullPath,
    method: Method,
    headers: HeaderMap,
    remote: Option<SocketAddr>,
    body: S,
) -> Response
where
    S: Stream<Item = Result<B, warp::Error>>,
    B: Buf,
{
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("webhook", %request_id, %method, path = path.as_str());

    async move {
        let remote = remote.map_or_else(|| "unknown".to_string(), |addr| addr.to_string());
        state
            .config
            .logger
            .log(&format!("{method} {} {remote}", path.as_str()));

        match receive(&state, &path, &method, &headers, &remote, body).await {
            Ok(notification) => {
                state
                    .config
                    .logger
                    .log(&format!("got {} event from {remote}", notification.name()));
                state.dispatcher.publish_notification(&notification);
                json_response(StatusCode::OK, &Reply::for_status(StatusCode::OK))
            }
            Err(error) => state.reject(error),
        }
    }
    .instrument(span)
    .await
}

/// Validate route and method, buffer the body, authenticate, and parse.
async fn receive<S, B>(
    state: &HookState,
    path: &FullPath,
    method: &Method,
    headers: &HeaderMap,
    remote: &str,
    body: S,
) -> Result<Notification, HookError>
where
    S: Stream<Item = Result<B, warp::Error>>,
    B: Buf,
{
    let logger = &state.config.logger;

    // 404 if the path is wrong; nothing else about the request is inspected
    if path.as_str() != state.config.path {
        logger.error(&format!("got invalid path from {remote}, returning 404"));
        return Err(HookError::RouteNotFound {
            path: path.as_str().to_string(),
        });
    }

    // 405 if the method is wrong
    if method != Method::POST {
        logger.error(&format!("got invalid method from {remote}, returning 405"));
        return Err(HookError::MethodNotAllowed {
            method: method.to_string(),
        });
    }

    let mut accumulator = BodyAccumulator::new(state.config.max_body_bytes);
    let mut body = Box::pin(body);
    while let Some(chunk) = body.next().await {
        let pushed = chunk
            .map_err(|e| HookError::BodyRead(e.to_string()))
            .and_then(|mut chunk| accumulator.push(chunk.copy_to_bytes(chunk.remaining())));

        if let Err(error) = pushed {
            logger.error(&format!(
                "failed to read body from {remote}: {error}, returning {}",
                error.status_code().as_u16()
            ));
            return Err(error);
        }
    }

    logger.log(&format!("received {} bytes from {remote}", accumulator.len()));
    let data = accumulator.finish();

    let authorization = headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok());
    if !state.checker.check(authorization) {
        tracing::debug!(%remote, "got invalid credentials");
        return Err(HookError::Unauthorized);
    }

    parse_notification(&data).map_err(|error| {
        tracing::debug!(%error, "payload failed to parse");
        logger.error(&format!("received invalid data from {remote}, returning 400"));
        HookError::from(error)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credentials;
    use crate::config::AuthFailureStatus;
    use crate::logger::testing::RecordingLogger;
    use std::sync::Mutex;

    const NEW_ACCOUNT: &str = "<new_account_notification><account><account_code>1</account_code></account></new_account_notification>";

    /// Everything the dispatcher delivered, as (key, payload) pairs.
    type Log = Arc<Mutex<Vec<(String, String)>>>;

    fn state_with(config: HookConfig) -> (Arc<HookState>, Log) {
        let log: Log = Arc::default();
        let mut dispatcher = EventDispatcher::new(config.namespace.clone());

        let sink = log.clone();
        dispatcher.on("new_account_notification", move |data| {
            let code = data["new_account_notification"]["account"]["account_code"].to_string();
            sink.lock().unwrap().push(("event".into(), code));
        });
        let sink = log.clone();
        dispatcher.on_any(move |name, _| sink.lock().unwrap().push(("any".into(), name.into())));
        let sink = log.clone();
        dispatcher.on_error(move |_, reply| {
            sink.lock().unwrap().push(("error".into(), reply.message.clone()));
        });

        (Arc::new(HookState::new(config, dispatcher)), log)
    }

    fn state() -> (Arc<HookState>, Log) {
        state_with(HookConfig::new().with_credentials("user", "pass"))
    }

    fn auth(pass: &str) -> String {
        Credentials::new("user", pass).to_authorization()
    }

    fn reply_of(response: &warp::http::Response<bytes::Bytes>) -> Reply {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[tokio::test]
    async fn test_valid_notification_is_dispatched() {
        let (state, log) = state();
        let response = warp::test::request()
            .method("POST")
            .path("/recurly/callback")
            .header("authorization", auth("pass"))
            .body(NEW_ACCOUNT)
            .reply(&routes(state))
            .await;

        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["content-type"], "application/json");
        assert_eq!(response.body().as_ref(), br#"{"message":"ok","result":"ok"}"#);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                ("any".to_string(), "new_account_notification".to_string()),
                ("event".to_string(), "\"1\"".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_wrong_path_is_404_before_anything_else() {
        let (state, log) = state();
        let response = warp::test::request()
            .method("GET")
            .path("/wrong/path")
            .body("not even xml")
            .reply(&routes(state))
            .await;

        assert_eq!(response.status(), 404);
        assert_eq!(reply_of(&response), Reply::for_status(StatusCode::NOT_FOUND));
        assert_eq!(
            *log.lock().unwrap(),
            vec![("error".to_string(), "not found".to_string())]
        );
    }

    #[tokio::test]
    async fn test_query_string_does_not_affect_path_match() {
        let (state, _log) = state();
        let response = warp::test::request()
            .method("POST")
            .path("/recurly/callback?source=test")
            .header("authorization", auth("pass"))
            .body(NEW_ACCOUNT)
            .reply(&routes(state))
            .await;

        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_wrong_method_is_405() {
        let (state, log) = state();
        let response = warp::test::request()
            .method("GET")
            .path("/recurly/callback")
            .header("authorization", auth("pass"))
            .reply(&routes(state))
            .await;

        assert_eq!(response.status(), 405);
        assert_eq!(reply_of(&response).message, "method not allowed");
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_credentials_are_403_without_parsing() {
        let recorder = Arc::new(RecordingLogger::default());
        let config = HookConfig::new().with_credentials("user", "pass");
        let config = HookConfig {
            logger: recorder.clone(),
            ..config
        };
        let (state, log) = state_with(config);

        let response = warp::test::request()
            .method("POST")
            .path("/recurly/callback")
            .header("authorization", auth("wrong"))
            .body(NEW_ACCOUNT)
            .reply(&routes(state))
            .await;

        assert_eq!(response.status(), 403);
        assert!(response.headers().get("www-authenticate").is_none());
        assert_eq!(reply_of(&response).message, "forbidden");
        assert_eq!(
            *log.lock().unwrap(),
            vec![("error".to_string(), "forbidden".to_string())]
        );
        // Rejected credentials are only reported through tracing, not the request log
        assert!(recorder.errors().is_empty());
    }

    #[tokio::test]
    async fn test_challenge_mode_returns_401() {
        let (state, _log) = state_with(
            HookConfig::new()
                .with_credentials("user", "pass")
                .with_auth_failure(AuthFailureStatus::Challenge),
        );

        let response = warp::test::request()
            .method("POST")
            .path("/recurly/callback")
            .body(NEW_ACCOUNT)
            .reply(&routes(state))
            .await;

        assert_eq!(response.status(), 401);
        assert_eq!(response.headers()["www-authenticate"], "Basic realm=\"Recurly\"");
        assert_eq!(reply_of(&response).message, "unauthorized");
    }

    #[test]
    fn test_rejection_status_follows_auth_mode() {
        let (forbidding, _) = state();
        let (challenging, _) = state_with(
            HookConfig::new()
                .with_credentials("user", "pass")
                .with_auth_failure(AuthFailureStatus::Challenge),
        );

        assert_eq!(forbidding.status_for(&HookError::Unauthorized), StatusCode::FORBIDDEN);
        assert_eq!(challenging.status_for(&HookError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(
            challenging.status_for(&HookError::BodyRead("reset".to_string())),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_unconfigured_credentials_reject_everything() {
        let (state, _log) = state_with(HookConfig::new());
        let response = warp::test::request()
            .method("POST")
            .path("/recurly/callback")
            .body(NEW_ACCOUNT)
            .reply(&routes(state))
            .await;

        assert_eq!(response.status(), 403);
    }

    #[tokio::test]
    async fn test_malformed_xml_is_400() {
        let recorder = Arc::new(RecordingLogger::default());
        let config = HookConfig {
            logger: recorder.clone(),
            ..HookConfig::new().with_credentials("user", "pass")
        };
        let (state, log) = state_with(config);

        let response = warp::test::request()
            .method("POST")
            .path("/recurly/callback")
            .header("authorization", auth("pass"))
            .body("<new_account_notification><account>")
            .reply(&routes(state))
            .await;

        assert_eq!(response.status(), 400);
        assert_eq!(reply_of(&response).message, "bad request");
        assert_eq!(
            *log.lock().unwrap(),
            vec![("error".to_string(), "bad request".to_string())]
        );
        assert_eq!(
            recorder.errors(),
            vec!["received invalid data from unknown, returning 400".to_string()]
        );
    }

    #[tokio::test]
    async fn test_empty_body_is_400() {
        let (state, _log) = state();
        let response = warp::test::request()
            .method("POST")
            .path("/recurly/callback")
            .header("authorization", auth("pass"))
            .reply(&routes(state))
            .await;

        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn test_body_limit_is_413() {
        let (state, log) = state_with(
            HookConfig::new()
                .with_credentials("user", "pass")
                .with_max_body_bytes(16),
        );

        let response = warp::test::request()
            .method("POST")
            .path("/recurly/callback")
            .header("authorization", auth("pass"))
            .body(NEW_ACCOUNT)
            .reply(&routes(state))
            .await;

        assert_eq!(response.status(), 413);
        assert_eq!(
            *log.lock().unwrap(),
            vec![("error".to_string(), "payload too large".to_string())]
        );
    }

    #[tokio::test]
    async fn test_custom_path_and_namespace() {
        let log: Log = Arc::default();
        let config = HookConfig::new()
            .with_credentials("user", "pass")
            .with_path("/")
            .with_namespace("Billing");
        let mut dispatcher = EventDispatcher::new(config.namespace.clone());
        let sink = log.clone();
        dispatcher.subscribe("Billing.new_account_notification", move |_| {
            sink.lock().unwrap().push(("billing".into(), String::new()));
        });
        let state = Arc::new(HookState::new(config, dispatcher));

        let response = warp::test::request()
            .method("POST")
            .path("/")
            .header("authorization", auth("pass"))
            .body(NEW_ACCOUNT)
            .reply(&routes(state))
            .await;

        assert_eq!(response.status(), 200);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_requests_dispatch_independently() {
        let (state, log) = state();
        let filter = routes(state);

        for _ in 0..3 {
            let response = warp::test::request()
                .method("POST")
                .path("/recurly/callback")
                .header("authorization", auth("pass"))
                .body(NEW_ACCOUNT)
                .reply(&filter)
                .await;
            assert_eq!(response.status(), 200);
        }

        assert_eq!(log.lock().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_request_log_lines() {
        let recorder = Arc::new(RecordingLogger::default());
        let config = HookConfig {
            logger: recorder.clone(),
            ..HookConfig::new().with_credentials("user", "pass")
        };
        let (state, _log) = state_with(config);

        warp::test::request()
            .method("POST")
            .path("/recurly/callback")
            .header("authorization", auth("pass"))
            .remote_addr("10.0.0.7:5123".parse().unwrap())
            .body(NEW_ACCOUNT)
            .reply(&routes(state))
            .await;

        let lines: Vec<String> = recorder
            .lines
            .lock()
            .unwrap()
            .iter()
            .map(|(_, line)| line.clone())
            .collect();
        assert_eq!(
            lines,
            vec![
                "POST /recurly/callback 10.0.0.7:5123".to_string(),
                format!("received {} bytes from 10.0.0.7:5123", NEW_ACCOUNT.len()),
                "got new_account_notification event from 10.0.0.7:5123".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_listen_and_shutdown() {
        let config = HookConfig::new().with_host("127.0.0.1").with_port(0);
        let mut bound = None;
        let server = RecurlyHook::new(config)
            .listen_with(|addr| bound = Some(addr))
            .await
            .expect("Failed to start webhook server");

        assert_eq!(bound, Some(server.local_addr()));
        assert_ne!(server.local_addr().port(), 0);
        assert!(server.url().ends_with("/recurly/callback"));

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_listen_rejects_invalid_config() {
        let result = RecurlyHook::new(HookConfig::new().with_path("no-slash")).listen().await;
        assert!(matches!(result, Err(HookError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_listen_reports_bind_failure() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let result = RecurlyHook::new(HookConfig::new().with_host("127.0.0.1").with_port(port))
            .listen()
            .await;
        assert!(matches!(result, Err(HookError::Bind { .. })));

        drop(taken);
    }
}
