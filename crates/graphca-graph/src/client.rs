use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::{StaticToken, TokenProvider};
use crate::error::GraphError;

pub use graphca_domain::DEFAULT_GRAPH_ENDPOINT;

// ── URIs and OData ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    V1,
    Beta,
}

impl ApiVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiVersion::V1 => "v1.0",
            ApiVersion::Beta => "beta",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Uri {
    /// Entity path relative to the versioned Graph root, e.g. `/identity/conditionalAccess/policies`.
    Entity { version: ApiVersion, path: String },
    /// Fully-qualified URL, as handed back in `@odata.nextLink`.
    Absolute(String),
}

impl Uri {
    pub fn entity(version: ApiVersion, path: impl Into<String>) -> Self {
        Uri::Entity { version, path: path.into() }
    }

    pub fn url(&self, endpoint: &str) -> String {
        match self {
            Uri::Entity { version, path } => format!(
                "{}/{}{}",
                endpoint.trim_end_matches('/'),
                version.as_str(),
                path
            ),
            Uri::Absolute(url) => url.clone(),
        }
    }
}

/// OData query options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub filter:   Option<String>,
    pub select:   Vec<String>,
    pub expand:   Option<String>,
    pub order_by: Option<String>,
    pub top:      Option<u32>,
}

impl Query {
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        if let Some(f) = &self.filter {
            out.push(("$filter", f.clone()));
        }
        if !self.select.is_empty() {
            out.push(("$select", self.select.join(",")));
        }
        if let Some(e) = &self.expand {
            out.push(("$expand", e.clone()));
        }
        if let Some(o) = &self.order_by {
            out.push(("$orderby", o.clone()));
        }
        if let Some(t) = self.top {
            out.push(("$top", t.to_string()));
        }
        out
    }
}

// ── Retry policy ──────────────────────────────────────────────────────────────

/// Decides whether a response is a read-after-write consistency failure that
/// should be retried rather than surfaced.
pub type ConsistencyFailureFn = fn(status: u16, body: &[u8]) -> bool;

/// Treat any 404 as replication lag.
pub fn retry_on_404(status: u16, _body: &[u8]) -> bool {
    status == 404
}

/// Per-call retry switch. `Disabled` turns off both throttling/server-error
/// retries and consistency-failure retries for that one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryMode {
    #[default]
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySettings {
    /// Retries for 429 and 5xx responses.
    pub transient_attempts:   u32,
    /// Retries when the consistency-failure check matches.
    pub consistency_attempts: u32,
    pub base_delay:           Duration,
    pub max_delay:            Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            transient_attempts:   4,
            consistency_attempts: 8,
            base_delay:           Duration::from_secs(1),
            max_delay:            Duration::from_secs(30),
        }
    }
}

impl RetrySettings {
    /// Exponential backoff for the zero-based `attempt`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

// ── Requests ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RequestInput {
    pub uri:                 Uri,
    pub query:               Query,
    pub body:                Option<Vec<u8>>,
    pub valid_status_codes:  Vec<u16>,
    pub consistency_failure: Option<ConsistencyFailureFn>,
}

impl RequestInput {
    pub fn new(uri: Uri) -> Self {
        Self {
            uri,
            query: Query::default(),
            body: None,
            valid_status_codes: vec![200],
            consistency_failure: None,
        }
    }

    pub fn query(mut self, query: &Query) -> Self {
        self.query = query.clone();
        self
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, GraphError> {
        self.body = Some(serde_json::to_vec(body).map_err(GraphError::Encode)?);
        Ok(self)
    }

    pub fn valid_status(mut self, codes: &[u16]) -> Self {
        self.valid_status_codes = codes.to_vec();
        self
    }

    pub fn consistency_failure(mut self, f: ConsistencyFailureFn) -> Self {
        self.consistency_failure = Some(f);
        self
    }
}

#[derive(Debug, Clone)]
pub struct GraphResponse {
    pub status: u16,
    pub url:    String,
    pub body:   Vec<u8>,
}

impl GraphResponse {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, GraphError> {
        serde_json::from_slice(&self.body).map_err(|e| GraphError::BadResponse {
            url:     self.url.clone(),
            message: format!("decoding body: {}", e),
        })
    }
}

#[derive(Deserialize)]
struct Page<T> {
    value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

/// Extract `code: message` from a Graph error envelope.
pub(crate) fn parse_graph_error(body: &[u8]) -> (String, String) {
    let v: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
    let err = v.get("error").unwrap_or(&v);
    let code = err["code"].as_str().unwrap_or("Unknown").to_string();
    let message = err["message"].as_str().unwrap_or("unknown error").to_string();
    (code, message)
}

// ── GraphClient ───────────────────────────────────────────────────────────────

/// Thin JSON-over-HTTP wrapper for Microsoft Graph. Cheap to clone.
#[derive(Clone)]
pub struct GraphClient {
    http:     reqwest::Client,
    token:    Arc<dyn TokenProvider>,
    endpoint: String,
    retry:    RetrySettings,
}

impl GraphClient {
    pub fn new(
        http: reqwest::Client,
        token: Arc<dyn TokenProvider>,
        endpoint: impl Into<String>,
        retry: RetrySettings,
    ) -> Self {
        Self { http, token, endpoint: endpoint.into(), retry }
    }

    /// Client with a fixed bearer token, for mock servers.
    pub fn with_static_token(endpoint: impl Into<String>, token: &str, retry: RetrySettings) -> Self {
        Self::new(
            reqwest::Client::new(),
            Arc::new(StaticToken(token.to_string())),
            endpoint,
            retry,
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn get(&self, input: RequestInput, mode: RetryMode) -> Result<GraphResponse, GraphError> {
        self.execute(Method::GET, input, mode).await
    }

    pub async fn post(&self, input: RequestInput) -> Result<GraphResponse, GraphError> {
        self.execute(Method::POST, input, RetryMode::Enabled).await
    }

    pub async fn patch(&self, input: RequestInput) -> Result<GraphResponse, GraphError> {
        self.execute(Method::PATCH, input, RetryMode::Enabled).await
    }

    pub async fn delete(&self, input: RequestInput) -> Result<GraphResponse, GraphError> {
        self.execute(Method::DELETE, input, RetryMode::Enabled).await
    }

    /// GET every page of a collection, following `@odata.nextLink`.
    pub async fn list<T: DeserializeOwned>(
        &self,
        uri: Uri,
        query: &Query,
    ) -> Result<(Vec<T>, u16), GraphError> {
        let mut items = Vec::new();
        let mut input = RequestInput::new(uri).query(query).valid_status(&[200]);
        loop {
            let resp = self.get(input, RetryMode::Enabled).await?;
            let page: Page<T> = resp.decode()?;
            items.extend(page.value);
            match page.next_link {
                Some(next) => {
                    debug!(next = %next, "following nextLink");
                    input = RequestInput::new(Uri::Absolute(next)).valid_status(&[200]);
                }
                None => return Ok((items, resp.status)),
            }
        }
    }

    async fn execute(
        &self,
        method: Method,
        input: RequestInput,
        mode: RetryMode,
    ) -> Result<GraphResponse, GraphError> {
        let url = input.uri.url(&self.endpoint);
        let query = input.query.pairs();
        let mut transient = 0u32;
        let mut consistency = 0u32;

        loop {
            let token = self.token.token().await?;
            let mut req = self.http.request(method.clone(), &url).bearer_auth(&token);
            if !query.is_empty() {
                req = req.query(&query);
            }
            if let Some(body) = &input.body {
                req = req.header(CONTENT_TYPE, "application/json").body(body.clone());
            }

            debug!(method = %method, url = %url, "Graph request");
            let transport = |e: reqwest::Error| GraphError::Transport {
                method: method.to_string(),
                url:    url.clone(),
                source: e,
            };
            let resp = req.send().await.map_err(transport)?;
            let status = resp.status().as_u16();
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = resp.bytes().await.map_err(transport)?.to_vec();

            if mode == RetryMode::Enabled {
                if (status == 429 || status >= 500) && transient < self.retry.transient_attempts {
                    let delay = retry_after
                        .unwrap_or_else(|| self.retry.backoff(transient))
                        .min(self.retry.max_delay);
                    transient += 1;
                    warn!(method = %method, url = %url, status, attempt = transient, ?delay, "retrying Graph request");
                    tokio::time::sleep(delay).await;
                    continue;
                }

                if let Some(is_failure) = input.consistency_failure {
                    if is_failure(status, &body) && consistency < self.retry.consistency_attempts {
                        let delay = self.retry.backoff(consistency);
                        consistency += 1;
                        debug!(method = %method, url = %url, status, attempt = consistency, ?delay, "consistency failure, retrying");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                }
            }

            if !input.valid_status_codes.contains(&status) {
                let (code, message) = parse_graph_error(&body);
                return Err(GraphError::UnexpectedStatus {
                    method: method.to_string(),
                    url,
                    status,
                    code,
                    message,
                });
            }

            return Ok(GraphResponse { status, url, body });
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        matchers::{header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    pub(crate) fn fast_retry() -> RetrySettings {
        RetrySettings {
            transient_attempts:   2,
            consistency_attempts: 3,
            base_delay:           Duration::from_millis(1),
            max_delay:            Duration::from_millis(5),
        }
    }

    pub(crate) fn client(server: &MockServer) -> GraphClient {
        GraphClient::with_static_token(server.uri(), "fake-token", fast_retry())
    }

    #[test]
    fn uri_joins_version_and_path() {
        let uri = Uri::entity(ApiVersion::Beta, "/policies/authenticationStrengthPolicies");
        assert_eq!(
            uri.url("https://graph.microsoft.com/"),
            "https://graph.microsoft.com/beta/policies/authenticationStrengthPolicies"
        );
    }

    #[test]
    fn query_pairs_only_include_set_options() {
        let q = Query {
            filter: Some("displayName eq 'x'".into()),
            select: vec!["id".into(), "displayName".into()],
            top:    Some(5),
            ..Default::default()
        };
        assert_eq!(
            q.pairs(),
            vec![
                ("$filter", "displayName eq 'x'".to_string()),
                ("$select", "id,displayName".to_string()),
                ("$top", "5".to_string()),
            ]
        );
        assert!(Query::default().pairs().is_empty());
    }

    #[test]
    fn backoff_is_capped() {
        let r = RetrySettings::default();
        assert_eq!(r.backoff(0), Duration::from_secs(1));
        assert_eq!(r.backoff(3), Duration::from_secs(8));
        assert_eq!(r.backoff(10), Duration::from_secs(30));
    }

    #[test]
    fn parse_graph_error_fallback() {
        assert_eq!(
            parse_graph_error(b"not json"),
            ("Unknown".to_string(), "unknown error".to_string())
        );
        let body = br#"{"error":{"code":"Request_ResourceNotFound","message":"gone"}}"#;
        assert_eq!(
            parse_graph_error(body),
            ("Request_ResourceNotFound".to_string(), "gone".to_string())
        );
    }

    #[tokio::test]
    async fn consistency_failure_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1.0/things/1"))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1.0/things/1"))
            .and(header("authorization", "Bearer fake-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "1" })))
            .with_priority(2)
            .mount(&server)
            .await;

        let input = RequestInput::new(Uri::entity(ApiVersion::V1, "/things/1"))
            .consistency_failure(retry_on_404);
        let resp = client(&server).get(input, RetryMode::Enabled).await.unwrap();
        assert_eq!(resp.status, 200);
    }

    #[tokio::test]
    async fn disabled_retries_surface_404_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1.0/things/1"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "code": "Request_ResourceNotFound", "message": "Resource '1' does not exist" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let input = RequestInput::new(Uri::entity(ApiVersion::V1, "/things/1"))
            .consistency_failure(retry_on_404);
        let err = client(&server).get(input, RetryMode::Disabled).await.unwrap_err();
        assert!(err.is_not_found(), "got: {}", err);
        assert!(err.to_string().contains("Request_ResourceNotFound"));
    }

    #[tokio::test]
    async fn consistency_retries_are_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1.0/things/1"))
            .respond_with(ResponseTemplate::new(404))
            .expect(4)
            .mount(&server)
            .await;

        let input = RequestInput::new(Uri::entity(ApiVersion::V1, "/things/1"))
            .consistency_failure(retry_on_404);
        let err = client(&server).get(input, RetryMode::Enabled).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn throttling_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1.0/things"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1.0/things"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "new" })))
            .with_priority(2)
            .mount(&server)
            .await;

        let input = RequestInput::new(Uri::entity(ApiVersion::V1, "/things"))
            .json(&json!({ "displayName": "x" }))
            .unwrap()
            .valid_status(&[201]);
        let resp = client(&server).post(input).await.unwrap();
        let v: Value = resp.decode().unwrap();
        assert_eq!(v["id"], "new");
    }

    #[tokio::test]
    async fn unexpected_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v1.0/things/1"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "code": "BadRequest", "message": "invalid property" }
            })))
            .mount(&server)
            .await;

        let input = RequestInput::new(Uri::entity(ApiVersion::V1, "/things/1")).valid_status(&[204]);
        let err = client(&server).patch(input).await.unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert!(err.to_string().contains("invalid property"));
    }

    #[tokio::test]
    async fn malformed_body_is_bad_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1.0/things/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let resp = client(&server)
            .get(RequestInput::new(Uri::entity(ApiVersion::V1, "/things/1")), RetryMode::Enabled)
            .await
            .unwrap();
        let err = resp.decode::<Value>().unwrap_err();
        assert!(matches!(err, GraphError::BadResponse { .. }));
    }

    #[tokio::test]
    async fn list_follows_next_link() {
        let server = MockServer::start().await;
        let next = format!("{}/v1.0/things?$skiptoken=abc", server.uri());
        Mock::given(method("GET"))
            .and(path("/v1.0/things"))
            .and(query_param("$skiptoken", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{ "id": "3" }]
            })))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1.0/things"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{ "id": "1" }, { "id": "2" }],
                "@odata.nextLink": next,
            })))
            .with_priority(2)
            .mount(&server)
            .await;

        let (items, status) = client(&server)
            .list::<Value>(Uri::entity(ApiVersion::V1, "/things"), &Query::default())
            .await
            .unwrap();
        assert_eq!(status, 200);
        let ids: Vec<_> = items.iter().map(|v| v["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }
}
