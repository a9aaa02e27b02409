//! Remote-write transport
//!
//! The flush pipeline only needs to hand a compressed payload to something
//! that stores it. [`WriteClient`] is that seam; [`HttpWriteClient`] is the
//! production implementation posting to a Prometheus-compatible endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_ENCODING, CONTENT_TYPE};
use tracing::debug;

use crate::config::Config;
use crate::error::WriteError;

/// Protocol version announced with every request
pub const REMOTE_WRITE_VERSION: &str = "0.1.0";

const REMOTE_WRITE_VERSION_HEADER: &str = "X-Prometheus-Remote-Write-Version";

/// Longest response body kept in a [`WriteError::Status`]
const MAX_ERROR_BODY: usize = 512;

/// Destination for encoded remote-write payloads
#[async_trait]
pub trait WriteClient: Send + Sync {
    /// Store one snappy-compressed `WriteRequest`
    async fn store(&self, payload: Vec<u8>) -> Result<(), WriteError>;

    /// Client name used in logs
    fn name(&self) -> &str;

    /// Endpoint the client writes to
    fn endpoint(&self) -> &str;
}

/// Mutates an outgoing request right before it is sent
///
/// Used for schemes that sign the final request, such as cloud provider
/// request signatures.
pub trait RequestSigner: Send + Sync {
    /// Sign the request in place
    fn sign(&self, request: &mut reqwest::Request) -> Result<(), WriteError>;
}

/// Credentials attached to each request
#[derive(Clone)]
enum Auth {
    None,
    Basic { username: String, password: Option<String> },
    Bearer(String),
}

/// HTTP remote-write client
pub struct HttpWriteClient {
    name: String,
    endpoint: String,
    client: reqwest::Client,
    auth: Auth,
    signer: Option<Arc<dyn RequestSigner>>,
}

impl std::fmt::Debug for HttpWriteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpWriteClient")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("signed", &self.signer.is_some())
            .finish()
    }
}

impl HttpWriteClient {
    /// Build a client from the output configuration
    ///
    /// Reads the client certificate and key from disk when configured.
    pub fn from_config(config: &Config) -> Result<Self, WriteError> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("prw-output/", env!("CARGO_PKG_VERSION")))
            .default_headers(default_headers(config)?)
            .danger_accept_invalid_certs(config.insecure_skip_tls_verify);

        if let (Some(cert), Some(key)) = (&config.client_certificate, &config.client_certificate_key)
        {
            let mut pem = std::fs::read(cert).map_err(|e| {
                WriteError::Setup(format!("failed to read certificate {}: {}", cert.display(), e))
            })?;
            pem.push(b'\n');
            pem.extend(std::fs::read(key).map_err(|e| {
                WriteError::Setup(format!("failed to read key {}: {}", key.display(), e))
            })?);
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| WriteError::Setup(format!("failed to load the TLS certificate: {}", e)))?;
            builder = builder.identity(identity);
        }

        let client = builder.build()?;

        let auth = match (&config.username, &config.bearer_token) {
            (Some(username), _) => Auth::Basic {
                username: username.clone(),
                password: config.password.clone(),
            },
            (None, Some(token)) => Auth::Bearer(token.clone()),
            (None, None) => Auth::None,
        };

        Ok(Self {
            name: "prw-output".to_string(),
            endpoint: config.url.clone(),
            client,
            auth,
            signer: None,
        })
    }

    /// Create a client for `endpoint` with a request timeout and no credentials
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, WriteError> {
        let config = Config {
            url: endpoint.into(),
            timeout,
            ..Config::default()
        };
        Self::from_config(&config)
    }

    /// Attach a request signer
    pub fn with_signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Override the client name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn build_request(&self, payload: Vec<u8>) -> Result<reqwest::Request, WriteError> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_ENCODING, "snappy")
            .header(CONTENT_TYPE, "application/x-protobuf")
            .header(REMOTE_WRITE_VERSION_HEADER, REMOTE_WRITE_VERSION)
            .body(payload);

        builder = match &self.auth {
            Auth::None => builder,
            Auth::Basic { username, password } => builder.basic_auth(username, password.as_ref()),
            Auth::Bearer(token) => builder.bearer_auth(token),
        };

        let mut request = builder.build()?;
        if let Some(signer) = &self.signer {
            signer.sign(&mut request)?;
        }
        Ok(request)
    }
}

#[async_trait]
impl WriteClient for HttpWriteClient {
    async fn store(&self, payload: Vec<u8>) -> Result<(), WriteError> {
        let bytes = payload.len();
        let request = self.build_request(payload)?;

        let response = self.client.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(WriteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(endpoint = %self.endpoint, bytes, status = status.as_u16(), "remote write stored");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn default_headers(config: &Config) -> Result<HeaderMap, WriteError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| WriteError::Setup(format!("invalid header name {:?}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| WriteError::Setup(format!("invalid value for header {}: {}", name, e)))?;
        headers.insert(name, value);
    }
    Ok(headers)
}
