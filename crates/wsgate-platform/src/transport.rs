//! Out-of-band delivery through the platform's connections endpoint.
//!
//! Endpoints derived from the event (`https://<domainName>/<stage>`) are the
//! real management API and are called through the AWS SDK, which signs
//! every request with credentials from the environment. An explicitly
//! configured endpoint (the local emulator, a test server) gets a plain
//! unsigned POST.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_apigatewaymanagement::Client as ManagementClient;
use aws_sdk_apigatewaymanagement::config::{Builder as ManagementConfig, Region};
use aws_sdk_apigatewaymanagement::error::DisplayErrorContext;
use aws_sdk_apigatewaymanagement::primitives::Blob;
use bytes::Bytes;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use wsgate_core::constants::CONNECTIONS_PATH;
use wsgate_core::{ConnectionId, DeliveryError, DeliveryResult, RequestContext, Transport, record_failure};

/// Characters left unescaped in a connection id path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// How requests reach the endpoint.
#[derive(Clone, Debug)]
enum Delivery {
    /// Unsigned POST (explicit endpoint override).
    Plain(reqwest::Client),
    /// SDK `PostToConnection`, signed. The client is built on first use so
    /// invocations that never deliver never resolve credentials.
    Signed(Arc<OnceCell<ManagementClient>>),
}

/// Delivers to `<endpoint>/@connections/<id>`.
///
/// 200 is success, 410 (`GoneException`) means the connection is gone,
/// anything else is a transport error.
#[derive(Clone, Debug)]
pub struct ManagedTransport {
    delivery: Delivery,
    endpoint: Option<String>,
}

impl ManagedTransport {
    /// Unsigned transport posting to `endpoint` (e.g. `http://127.0.0.1:7886`).
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            delivery: Delivery::Plain(
                reqwest::Client::builder()
                    .timeout(Duration::from_secs(10))
                    .user_agent(concat!("wsgate/", env!("CARGO_PKG_VERSION")))
                    .build()
                    .unwrap_or_default(),
            ),
            endpoint: Some(trim_endpoint(endpoint.into())),
        }
    }

    /// Signed transport for `endpoint` using `sdk` for credentials and region.
    ///
    /// When `sdk` has no region, the region is read from an
    /// `*.execute-api.<region>.amazonaws.com` endpoint host.
    pub fn signed(endpoint: impl Into<String>, sdk: &SdkConfig) -> Self {
        let endpoint = trim_endpoint(endpoint.into());
        let client = management_client(&endpoint, sdk);
        Self {
            delivery: Delivery::Signed(Arc::new(OnceCell::new_with(Some(client)))),
            endpoint: Some(endpoint),
        }
    }

    /// Signed transport addressed by the event's `domainName` and `stage`,
    /// loading credentials from the environment on first delivery.
    pub fn for_request(request: &RequestContext) -> Self {
        Self {
            delivery: Delivery::Signed(Arc::new(OnceCell::new())),
            endpoint: endpoint_from_request(request),
        }
    }

    /// Base endpoint, if one could be determined.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Whether requests are signed.
    pub fn is_signed(&self) -> bool {
        matches!(self.delivery, Delivery::Signed(_))
    }

    /// Delivery URL for `connection_id`.
    pub fn connection_url(&self, connection_id: &ConnectionId) -> Option<String> {
        self.endpoint.as_ref().map(|endpoint| {
            format!(
                "{endpoint}/{CONNECTIONS_PATH}/{}",
                utf8_percent_encode(connection_id.as_str(), SEGMENT)
            )
        })
    }

    async fn post(&self, connection_id: &ConnectionId, payload: Bytes) -> DeliveryResult {
        let Some(endpoint) = self.endpoint.as_deref() else {
            return Err(DeliveryError::Transport("no delivery endpoint configured".into()));
        };
        match &self.delivery {
            Delivery::Plain(client) => post_plain(client, endpoint, connection_id, payload).await,
            Delivery::Signed(cell) => {
                let client = cell
                    .get_or_init(|| async {
                        let sdk = aws_config::load_defaults(BehaviorVersion::latest()).await;
                        management_client(endpoint, &sdk)
                    })
                    .await;
                post_signed(client, connection_id, payload).await
            }
        }
    }
}

async fn post_plain(
    client: &reqwest::Client,
    endpoint: &str,
    connection_id: &ConnectionId,
    payload: Bytes,
) -> DeliveryResult {
    let url = format!(
        "{endpoint}/{CONNECTIONS_PATH}/{}",
        utf8_percent_encode(connection_id.as_str(), SEGMENT)
    );
    let response = client
        .post(&url)
        .body(payload)
        .send()
        .await
        .map_err(|e| DeliveryError::Transport(format!("delivery request failed: {e}")))?;

    match response.status().as_u16() {
        200 => {
            debug!(connection_id = %connection_id, "delivered");
            Ok(())
        }
        410 => Err(DeliveryError::ConnectionNotFound(connection_id.clone())),
        status => Err(DeliveryError::Transport(format!(
            "delivery endpoint returned {status}"
        ))),
    }
}

async fn post_signed(client: &ManagementClient, connection_id: &ConnectionId, payload: Bytes) -> DeliveryResult {
    let result = client
        .post_to_connection()
        .connection_id(connection_id.as_str())
        .data(Blob::new(payload.to_vec()))
        .send()
        .await;

    match result {
        Ok(_) => {
            debug!(connection_id = %connection_id, "delivered");
            Ok(())
        }
        Err(err) if err.as_service_error().is_some_and(|e| e.is_gone_exception()) => {
            Err(DeliveryError::ConnectionNotFound(connection_id.clone()))
        }
        Err(err) => Err(DeliveryError::Transport(format!(
            "delivery request failed: {}",
            DisplayErrorContext(&err)
        ))),
    }
}

fn management_client(endpoint: &str, sdk: &SdkConfig) -> ManagementClient {
    let mut config = ManagementConfig::from(sdk).endpoint_url(endpoint);
    if sdk.region().is_none() {
        if let Some(region) = region_from_endpoint(endpoint) {
            config = config.region(Region::new(region));
        }
    }
    ManagementClient::from_conf(config.build())
}

fn trim_endpoint(endpoint: String) -> String {
    endpoint.trim_end_matches('/').to_owned()
}

/// `https://<domainName>/<stage>` when both are present.
pub fn endpoint_from_request(request: &RequestContext) -> Option<String> {
    let domain = request.domain_name.as_deref().filter(|d| !d.is_empty())?;
    let stage = request.stage.as_deref().filter(|s| !s.is_empty())?;
    Some(format!("https://{domain}/{stage}"))
}

/// Region named by an `<id>.execute-api.<region>.amazonaws.com` host.
pub fn region_from_endpoint(endpoint: &str) -> Option<String> {
    let host = endpoint
        .split("://")
        .nth(1)
        .unwrap_or(endpoint)
        .split(['/', ':'])
        .next()?;
    let mut labels = host.split('.');
    let _api_id = labels.next()?;
    if labels.next()? != "execute-api" {
        return None;
    }
    let region = labels.next()?;
    (labels.next()? == "amazonaws").then(|| region.to_owned())
}

#[async_trait]
impl Transport for ManagedTransport {
    fn name(&self) -> &'static str {
        "managed"
    }

    async fn send(&self, connection_id: &ConnectionId, payload: Bytes) -> DeliveryResult {
        let result = self.post(connection_id, payload).await;
        if let Err(err) = &result {
            record_failure(err);
            if !err.is_gone() {
                warn!(connection_id = %connection_id, error = %err, "delivery failed");
            }
        }
        result
    }
}
