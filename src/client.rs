use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::header;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    dispatch,
    local_data::substitute,
    params::encode_query,
    retry::{cancellable, wait_before_retry, RetryDecision, RetryState},
    transport::{HttpRequest, HttpResponse, ReqwestTransport, TerminalState, Transport},
    wire::{ErrorResponse, WrappedRequest},
    CallOutcome, ConnectionState, DownloadManager, HttpMethod, LocalData, NetworkConfig,
    NetworkError, NoLocalData, RequestKind, Result, RouteRegistry, ServerFailure, WrapPolicy,
};

/// Header carrying [`NetworkConfig::client_version`].
pub const CLIENT_VERSION_HEADER: &str = "client-version";

/// Per-call knobs that are not part of a request kind's routing metadata.
#[derive(Clone, Debug, Default)]
pub struct CallOptions {
    /// Sent as `Authorization: Bearer <token>` when non-empty.
    pub bearer_token: Option<String>,
    /// Overrides the method's default for attaching a body. Ignored for POST.
    pub include_body: Option<bool>,
    /// Cancels the exchange in flight and any pending backoff.
    pub cancel: Option<CancellationToken>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn include_body(mut self, include: bool) -> Self {
        self.include_body = Some(include);
        self
    }

    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Request execution engine for one backend.
///
/// Cloning is cheap; clones share configuration, routes, and [`ConnectionState`].
#[derive(Clone)]
pub struct HttpService {
    transport: Arc<dyn Transport>,
    config: Arc<NetworkConfig>,
    routes: Arc<RouteRegistry>,
    local_data: Arc<dyn LocalData>,
    state: ConnectionState,
    policy: WrapPolicy,
}

impl fmt::Debug for HttpService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpService")
            .field("host", &self.config.host)
            .field("policy", &self.policy)
            .field("routes", &self.routes.len())
            .field("state", &self.state)
            .finish()
    }
}

impl HttpService {
    /// Creates a service over `reqwest` using the configured wrap policy.
    pub fn new(config: NetworkConfig, routes: RouteRegistry) -> Self {
        Self {
            transport: Arc::new(ReqwestTransport::new()),
            policy: config.wrap_policy,
            config: Arc::new(config),
            routes: Arc::new(routes),
            local_data: Arc::new(NoLocalData),
            state: ConnectionState::new(),
        }
    }

    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    /// Supplies placeholder values for route templates.
    pub fn with_local_data(self, local_data: impl LocalData + 'static) -> Self {
        self.with_shared_local_data(Arc::new(local_data))
    }

    /// Like [`with_local_data`](Self::with_local_data) for data owned elsewhere.
    pub fn with_shared_local_data(mut self, local_data: Arc<dyn LocalData>) -> Self {
        self.local_data = local_data;
        self
    }

    pub fn with_wrap_policy(mut self, policy: WrapPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn routes(&self) -> &RouteRegistry {
        &self.routes
    }

    pub fn wrap_policy(&self) -> WrapPolicy {
        self.policy
    }

    /// Connectivity and in-flight flags shared by every call on this service.
    pub fn connection(&self) -> &ConnectionState {
        &self.state
    }

    /// Streaming downloads over the same transport, using the download timeout.
    pub fn downloads(&self) -> DownloadManager {
        DownloadManager::new(Arc::clone(&self.transport), Arc::clone(&self.config))
    }

    pub fn download_path(&self, path: impl AsRef<Path>) -> PathBuf {
        self.config.download_path(path)
    }

    /// Sends `payload` as request kind `K` with default options.
    pub async fn send<K: RequestKind>(
        &self,
        payload: &K::Payload,
    ) -> Result<CallOutcome<K::Output>> {
        self.send_with::<K>(payload, &CallOptions::default()).await
    }

    /// Sends `payload` as request kind `K`.
    ///
    /// Connection-level failures (status 0) are retried with a fixed delay up to
    /// the kind's retry budget. Error statuses end the call at once and come
    /// back as [`CallOutcome::ServerError`].
    pub async fn send_with<K: RequestKind>(
        &self,
        payload: &K::Payload,
        options: &CallOptions,
    ) -> Result<CallOutcome<K::Output>> {
        let descriptor = self.routes.resolve::<K>()?;
        let mut processor = self.routes.processor::<K>()?;

        #[cfg(feature = "fake-data")]
        if let Some(output) = self.routes.fake_response::<K>() {
            debug!(kind = descriptor.kind(), "serving fake response");
            dispatch::run_lifecycle(processor.as_mut(), &output, payload);
            return Ok(CallOutcome::Success(output));
        }

        let method = descriptor.method();
        let query = if method.carries_query() {
            encode_query(
                payload,
                &self.config.param_delimiter,
                &self.config.param_separator,
            )?
        } else {
            String::new()
        };
        let path = substitute(
            &format!("{}{query}", descriptor.route()),
            self.local_data.as_ref(),
        );
        let uri = format!("{}{path}", self.config.host);

        let include_body = method == HttpMethod::Post
            || options
                .include_body
                .unwrap_or_else(|| method.includes_body_by_default());
        let body = if include_body {
            Some(self.encode_body(payload)?)
        } else {
            None
        };
        let request = self.build_request(method, &uri, body, options.bearer_token.as_deref());

        let max_retries = descriptor.max_retries().unwrap_or(self.config.max_retries);
        let retry = RetryState::new(max_retries, self.config.allow_retry);
        let cancel = options.cancel.as_ref();

        let _in_flight = self.state.begin_call();
        let response = self.execute(request, retry, cancel).await?;

        if response.is_success() {
            let output = dispatch::dispatch::<K>(
                &uri,
                &response.body,
                self.policy,
                processor.as_mut(),
                payload,
            )?;
            return Ok(CallOutcome::Success(output));
        }

        let failure = server_failure(uri, &response);
        processor.error_process(failure.status);
        Ok(CallOutcome::ServerError(failure))
    }

    /// Runs the attempt loop until a status line arrives or the call ends.
    async fn execute(
        &self,
        request: HttpRequest,
        mut retry: RetryState,
        cancel: Option<&CancellationToken>,
    ) -> Result<HttpResponse> {
        loop {
            trace_request(&request);
            let response = cancellable(self.transport.send(request.clone()), cancel)
                .await
                .map_err(|err| {
                    info!(uri = %request.uri, "request cancelled");
                    err
                })?;
            trace_response(&request.uri, &response);

            let transient = response.status == 0
                && matches!(response.state, TerminalState::Finished | TerminalState::Error);
            if response.state == TerminalState::Finished && !transient {
                self.state.set_internet(true);
                return Ok(response);
            }
            if !transient {
                return Err(transport_fault(&request.uri, &response));
            }

            match retry.on_transient_failure() {
                RetryDecision::Retry(count) => {
                    self.state.set_internet(true);
                    warn!(
                        uri = %request.uri,
                        retry = count,
                        max_retries = retry.max_retries(),
                        error = %response.message,
                        "connection failed, retrying"
                    );
                    wait_before_retry(self.config.retry_delay(), cancel).await?;
                }
                RetryDecision::Exhausted => {
                    self.state.set_internet(false);
                    error!(
                        uri = %request.uri,
                        attempts = retry.attempts(),
                        error = %response.message,
                        "connection failed, giving up"
                    );
                    return Err(NetworkError::ConnectivityExhausted {
                        uri: request.uri,
                        attempts: retry.attempts(),
                        message: response.message,
                    });
                }
            }
        }
    }

    fn encode_body<T: Serialize + ?Sized>(&self, payload: &T) -> Result<Vec<u8>> {
        let encoded = if self.policy.wraps_request {
            serde_json::to_vec(&WrappedRequest { data: payload })
        } else {
            serde_json::to_vec(payload)
        };
        encoded.map_err(|err| NetworkError::Encode(format!("request body: {err}")))
    }

    fn build_request(
        &self,
        method: HttpMethod,
        uri: &str,
        body: Option<Vec<u8>>,
        token: Option<&str>,
    ) -> HttpRequest {
        let mut request = HttpRequest::new(method, uri)
            .timeout(self.config.http_timeout())
            .header(header::CONTENT_TYPE.as_str(), "application/json");
        if let Some(token) = token.filter(|token| !token.trim().is_empty()) {
            request = request.header(
                header::AUTHORIZATION.as_str(),
                normalize_bearer_authorization(token),
            );
        }
        if let Some(version) = self
            .config
            .client_version
            .as_deref()
            .filter(|version| !version.is_empty())
        {
            request = request.header(CLIENT_VERSION_HEADER, version);
        }
        request.body = body;
        request
    }
}

fn server_failure(uri: String, response: &HttpResponse) -> ServerFailure {
    let body = response.body_text();
    let error = if response.status == 400 {
        serde_json::from_slice::<ErrorResponse>(&response.body).ok()
    } else {
        None
    };

    match &error {
        Some(parsed) => error!(
            %uri,
            status = response.status,
            code = ?parsed.code,
            message = parsed.message.as_deref().unwrap_or_default(),
            "server rejected request"
        ),
        None => error!(
            %uri,
            status = response.status,
            %body,
            "request finished but server sent an error"
        ),
    }

    ServerFailure {
        uri,
        status: response.status,
        body,
        error,
    }
}

fn transport_fault(uri: &str, response: &HttpResponse) -> NetworkError {
    let kind = response.state.fault_kind();
    match response.state {
        TerminalState::Aborted => warn!(%uri, error = %response.message, "request aborted"),
        TerminalState::ConnectionTimedOut => {
            error!(%uri, error = %response.message, "connection timed out")
        }
        TerminalState::TimedOut => {
            error!(%uri, error = %response.message, "processing the request timed out")
        }
        _ => error!(%uri, error = %response.message, "request ended with an error"),
    }
    NetworkError::TransportFault {
        uri: uri.to_owned(),
        kind,
        message: response.message.clone(),
    }
}

fn api_log_enabled() -> bool {
    cfg!(any(debug_assertions, feature = "api-log"))
}

fn trace_request(request: &HttpRequest) {
    if !api_log_enabled() {
        return;
    }
    let headers: Vec<String> = request
        .headers
        .iter()
        .map(|(name, value)| {
            if name.eq_ignore_ascii_case(header::AUTHORIZATION.as_str()) {
                format!("{name}: <redacted>")
            } else {
                format!("{name}: {value}")
            }
        })
        .collect();
    let body = request
        .body
        .as_deref()
        .map(String::from_utf8_lossy)
        .unwrap_or_default();
    debug!(uri = %request.uri, method = %request.method, ?headers, %body, "[REQUEST]");
}

fn trace_response(uri: &str, response: &HttpResponse) {
    if !api_log_enabled() {
        return;
    }
    debug!(
        %uri,
        status = response.status,
        state = ?response.state,
        body = %String::from_utf8_lossy(&response.body),
        "[RESPONSE]"
    );
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
