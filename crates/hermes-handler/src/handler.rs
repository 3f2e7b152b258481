//! HTTP adapter exposing a local resource and a cluster-wide aggregation
//! of the same resource across peers.

use crate::error::HermesError;
use crate::events::HandlerEvent;
use crate::protocol::{join_framed_body, split_framed_body, splice_entity_arrays};
use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use hermes_core::EventListeners;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

#[cfg(feature = "metrics")]
use metrics::counter;

#[cfg(feature = "tracing")]
use tracing::warn;

/// Caps concurrent peer requests across every [`ResourceHandler`] in the
/// process: the fan-out semaphore is process-global, not per-handler.
static FAN_OUT_SEMAPHORE: LazyLock<Semaphore> = LazyLock::new(|| Semaphore::new(100));

const DEFAULT_PEER_PORT: u16 = 4378;
const PEER_TIMEOUT: Duration = Duration::from_secs(60);

/// A `{host, message}` entry in an aggregated response's `failures` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEntry {
    pub host: String,
    pub message: String,
}

impl FailureEntry {
    fn new(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            message: message.into(),
        }
    }
}

impl From<HermesError> for FailureEntry {
    fn from(err: HermesError) -> Self {
        FailureEntry::new(err.host, err.message)
    }
}

/// Supplies the local node's view of a resource. Invoked both for the
/// plain local endpoint and as the in-process leg of a cluster fan-out
/// (a peer whose host is the local node's own host skips HTTP entirely).
///
/// The sampler itself may be synchronous or suspendable underneath; the
/// handler only ever awaits this trait's async contract. Returns the
/// entities alongside zero or more non-fatal failure messages (entities
/// the source could not include); the handler prefixes each message
/// with the local host to produce a `{host, message}` failure entry.
#[async_trait]
pub trait LocalSource<T>: Send + Sync {
    async fn sample(&self) -> (Vec<T>, Vec<String>);
}

/// Supplies the peer list used by a `_cluster` request that omits an
/// explicit `locations` body.
#[async_trait]
pub trait PeerListProvider: Send + Sync {
    async fn peers(&self) -> Vec<String>;
}

#[derive(Debug, Deserialize)]
struct FramingParams {
    #[serde(rename = "return-as-2-json-objects")]
    return_as_2_json_objects: Option<String>,
}

impl FramingParams {
    fn wants_framed(&self) -> bool {
        self.return_as_2_json_objects.as_deref() == Some("yes")
    }
}

#[derive(Debug, Deserialize)]
struct ClusterRequestBody {
    locations: Vec<String>,
}

#[derive(Serialize)]
struct AggregatedResponseRef<'a, T> {
    entities: &'a [T],
    failures: &'a [FailureEntry],
}

/// Binds a resource name to a local sampler and a default peer list,
/// and serves both the local and cluster-aggregated endpoints for it.
pub struct ResourceHandler<T> {
    resource_name: String,
    host: String,
    secret: Option<String>,
    local: Arc<dyn LocalSource<T>>,
    peer_provider: Arc<dyn PeerListProvider>,
    http: reqwest::Client,
    events: EventListeners<HandlerEvent>,
}

impl<T> ResourceHandler<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Creates a handler for `resource_name`, reporting `host` as this
    /// node's identity in failure entries and local-leg peer matching.
    pub fn new(
        resource_name: impl Into<String>,
        host: impl Into<String>,
        secret: Option<String>,
        local: Arc<dyn LocalSource<T>>,
        peer_provider: Arc<dyn PeerListProvider>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(PEER_TIMEOUT)
            .build()
            .expect("reqwest client configuration is always valid");

        Self {
            resource_name: resource_name.into(),
            host: host.into(),
            secret,
            local,
            peer_provider,
            http,
            events: EventListeners::new(),
        }
    }

    /// Registers a listener for this handler's cluster fan-out events.
    pub fn add_listener<L>(&mut self, listener: L)
    where
        L: hermes_core::EventListener<HandlerEvent> + 'static,
    {
        self.events.add(listener);
    }

    /// Builds the axum router serving `/v2/{resource}` and
    /// `/v2/{resource}/_cluster` for this handler.
    pub fn router(self: Arc<Self>) -> Router {
        let local_path = format!("/v2/{}", self.resource_name);
        let cluster_path = format!("/v2/{}/_cluster", self.resource_name);
        Router::new()
            .route(&local_path, get(local_endpoint::<T>))
            .route(&cluster_path, get(cluster_endpoint::<T>))
            .with_state(self)
    }

    async fn local_entities_and_failures(&self) -> (Vec<T>, Vec<FailureEntry>) {
        let (entities, messages) = self.local.sample().await;
        let failures = messages
            .into_iter()
            .map(|message| FailureEntry::new(&self.host, message))
            .collect();
        (entities, failures)
    }

    /// Runs the fan-out for `locations`, returning the merged raw
    /// entities array bytes and the collected failure entries.
    async fn aggregate(self: &Arc<Self>, locations: Vec<String>) -> (Vec<u8>, Vec<FailureEntry>) {
        let peers_requested = locations.len();
        let mut tasks = Vec::with_capacity(locations.len());
        for location in locations {
            let handler = Arc::clone(self);
            tasks.push(tokio::spawn(async move { handler.fetch_peer(location).await }));
        }

        let mut entity_arrays: Vec<Vec<u8>> = Vec::with_capacity(tasks.len());
        let mut failures = Vec::new();
        for task in tasks {
            match task.await {
                Ok(Ok((entities_bytes, node_failures))) => {
                    entity_arrays.push(entities_bytes);
                    failures.extend(node_failures);
                }
                Ok(Err(failure)) => {
                    #[cfg(feature = "tracing")]
                    warn!(host = %failure.host, message = %failure.message, "peer request failed during fan-out");

                    #[cfg(feature = "metrics")]
                    counter!("hermes_peer_failures_total", "resource" => self.resource_name.clone())
                        .increment(1);

                    self.events.emit(&HandlerEvent::PeerFailed {
                        resource: self.resource_name.clone(),
                        timestamp: Instant::now(),
                        host: failure.host.clone(),
                        message: failure.message.clone(),
                    });
                    failures.push(failure);
                }
                Err(join_error) => failures.push(FailureEntry::new(&self.host, join_error.to_string())),
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            resource = %self.resource_name,
            peers_requested,
            peers_failed = failures.len(),
            "cluster fan-out completed"
        );

        self.events.emit(&HandlerEvent::ClusterAggregated {
            resource: self.resource_name.clone(),
            timestamp: Instant::now(),
            peers_requested,
            peers_failed: failures.len(),
        });

        let merged = splice_entity_arrays(entity_arrays.iter().map(Vec::as_slice));
        (merged, failures)
    }

    async fn fetch_peer(&self, location: String) -> Result<(Vec<u8>, Vec<FailureEntry>), FailureEntry> {
        if host_of(&location) == self.host {
            let (entities, failures) = self.local_entities_and_failures().await;
            let bytes = serde_json::to_vec(&entities).unwrap_or_else(|_| b"[]".to_vec());
            return Ok((bytes, failures));
        }

        let _permit = FAN_OUT_SEMAPHORE
            .acquire()
            .await
            .expect("fan-out semaphore is never closed");

        let url = peer_url(&location);
        let mut request = self
            .http
            .get(&url)
            .query(&[("return-as-2-json-objects", "yes")]);
        if let Some(secret) = &self.secret {
            request = request.header("Appscale-Secret", secret);
        }

        let response = request
            .send()
            .await
            .map_err(|err| FailureEntry::new(&location, err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(FailureEntry::new(&location, format!("peer returned {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| FailureEntry::new(&location, err.to_string()))?;

        let (entities, failures_json) = split_framed_body(&body)
            .ok_or_else(|| FailureEntry::new(&location, "malformed response body".to_string()))?;
        let failures: Vec<FailureEntry> = serde_json::from_slice(failures_json).unwrap_or_default();

        Ok((entities.to_vec(), failures))
    }
}

fn host_of(location: &str) -> &str {
    location.split_once(':').map(|(host, _)| host).unwrap_or(location)
}

fn peer_url(location: &str) -> String {
    let (host, port) = match location.split_once(':') {
        Some((host, port)) => (host, port.parse().unwrap_or(DEFAULT_PEER_PORT)),
        None => (location, DEFAULT_PEER_PORT),
    };
    format!("http://{host}:{port}")
}

async fn local_endpoint<T>(
    State(handler): State<Arc<ResourceHandler<T>>>,
    Query(params): Query<FramingParams>,
) -> Response
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let (entities, failures) = handler.local_entities_and_failures().await;
    respond(&entities, &failures, params.wants_framed())
}

async fn cluster_endpoint<T>(
    State(handler): State<Arc<ResourceHandler<T>>>,
    body: Bytes,
) -> Response
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let locations = match parse_locations(&body) {
        Ok(locations) => locations,
        Err(reason) => return bad_request(&reason),
    };

    let locations = match locations {
        Some(locations) => locations,
        None => handler.peer_provider.peers().await,
    };

    let (entities_bytes, failures) = handler.aggregate(locations).await;
    let body = build_aggregated_body(&entities_bytes, &failures);

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::OK;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
    response
}

/// Parses a `_cluster` request body: `None` means no body (caller
/// should fall back to the default peer list), `Some(locations)` means
/// an explicit list was supplied. A present-but-malformed body (missing
/// or non-string `locations`) is an `Err` reason for a 400.
fn parse_locations(body: &[u8]) -> Result<Option<Vec<String>>, String> {
    if body.is_empty() {
        return Ok(None);
    }
    let parsed: ClusterRequestBody = serde_json::from_slice(body)
        .map_err(|_| "body must be a JSON object with a \"locations\" array of strings".to_string())?;
    Ok(Some(parsed.locations))
}

fn bad_request(reason: &str) -> Response {
    let payload = serde_json::json!({ "reason": reason });
    (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
}

fn respond<T: Serialize>(entities: &[T], failures: &[FailureEntry], framed: bool) -> Response {
    if framed {
        let entities_bytes = serde_json::to_vec(entities).unwrap_or_else(|_| b"[]".to_vec());
        let failures_bytes = serde_json::to_vec(failures).unwrap_or_else(|_| b"[]".to_vec());
        let body = join_framed_body(&entities_bytes, &failures_bytes);
        // No content-type: the framed body is a contract between peers,
        // not a document meant to be parsed as one value.
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = StatusCode::OK;
        return response;
    }

    let payload = AggregatedResponseRef { entities, failures };
    axum::Json(payload).into_response()
}

fn build_aggregated_body(entities_bytes: &[u8], failures: &[FailureEntry]) -> Vec<u8> {
    let failures_bytes = serde_json::to_vec(failures).unwrap_or_else(|_| b"[]".to_vec());
    let mut body = Vec::with_capacity(entities_bytes.len() + failures_bytes.len() + 32);
    body.extend_from_slice(b"{\"entities\":");
    body.extend_from_slice(entities_bytes);
    body.extend_from_slice(b",\"failures\":");
    body.extend_from_slice(&failures_bytes);
    body.push(b'}');
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_of_strips_an_optional_port() {
        assert_eq!(host_of("10.0.2.15:4378"), "10.0.2.15");
        assert_eq!(host_of("10.0.2.15"), "10.0.2.15");
    }

    #[test]
    fn peer_url_defaults_to_the_standard_port() {
        assert_eq!(peer_url("10.0.2.16"), "http://10.0.2.16:4378");
        assert_eq!(peer_url("10.0.2.16:9000"), "http://10.0.2.16:9000");
    }

    #[test]
    fn parse_locations_accepts_an_empty_body() {
        assert_eq!(parse_locations(b"").unwrap(), None);
    }

    #[test]
    fn parse_locations_accepts_an_explicit_list() {
        let body = br#"{"locations":["10.0.2.15","10.0.2.16:4378"]}"#;
        assert_eq!(
            parse_locations(body).unwrap(),
            Some(vec!["10.0.2.15".to_string(), "10.0.2.16:4378".to_string()])
        );
    }

    #[test]
    fn parse_locations_rejects_a_body_without_locations() {
        assert!(parse_locations(br#"{"oops":true}"#).is_err());
    }

    #[test]
    fn build_aggregated_body_matches_the_fan_out_merge_scenario() {
        let body = build_aggregated_body(b"[{\"pid\":1},\n\n{\"pid\":2}]", &[]);
        assert_eq!(
            String::from_utf8(body).unwrap(),
            "{\"entities\":[{\"pid\":1},\n\n{\"pid\":2}],\"failures\":[]}"
        );
    }

    #[derive(Clone)]
    struct FixedLocalSource {
        entities: Vec<serde_json::Value>,
    }

    #[async_trait]
    impl LocalSource<serde_json::Value> for FixedLocalSource {
        async fn sample(&self) -> (Vec<serde_json::Value>, Vec<String>) {
            (self.entities.clone(), Vec::new())
        }
    }

    struct EmptyPeerList;

    #[async_trait]
    impl PeerListProvider for EmptyPeerList {
        async fn peers(&self) -> Vec<String> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn cluster_endpoint_reports_one_failure_entry_per_failing_peer() {
        use axum::http::Request;
        use tower::ServiceExt;

        let local = Arc::new(FixedLocalSource {
            entities: vec![serde_json::json!({"pid": 1})],
        }) as Arc<dyn LocalSource<serde_json::Value>>;
        let peer_provider = Arc::new(EmptyPeerList) as Arc<dyn PeerListProvider>;
        let handler = Arc::new(ResourceHandler::new(
            "processes",
            "10.0.0.1",
            None,
            local,
            peer_provider,
        ));
        let router = Arc::clone(&handler).router();

        // One location is the handler's own host, which takes the local
        // leg and always succeeds; the other two are unreachable
        // addresses, so exactly two of the three requested peers fail.
        let locations = vec![
            "10.0.0.1".to_string(),
            "127.0.0.1:1".to_string(),
            "127.0.0.2:1".to_string(),
        ];
        let body = serde_json::to_vec(&serde_json::json!({ "locations": locations })).unwrap();

        let request = Request::builder()
            .method("GET")
            .uri("/v2/processes/_cluster")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(parsed["entities"].as_array().unwrap().len(), 1);
        assert_eq!(parsed["failures"].as_array().unwrap().len(), 2);
    }
}
