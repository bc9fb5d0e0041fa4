//! Hand-written client for the EdgeStore management REST API.

pub mod models;

use crate::config::DriverConfig;
use reqwest::{header::CONTENT_TYPE, Client, Method, Response, StatusCode};
use url::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};
use tracing::debug;

/// Errors from the REST API layer.
#[derive(Debug, PartialEq, Eq)]
pub enum ApiClientError {
    /// Error while communicating with the server.
    ServerCommunication(String),
    /// Generic operation errors.
    GenericOperation(StatusCode, String),
    /// Problems with parsing response body.
    InvalidResponse(String),
    /// URL is malformed.
    MalformedUrl(String),
}

impl Display for ApiClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiClientError::ServerCommunication(details) => {
                write!(f, "server communication error: {details}")
            }
            ApiClientError::GenericOperation(status, details) => {
                write!(f, "operation failed with status {status}: {details}")
            }
            ApiClientError::InvalidResponse(details) => {
                write!(f, "invalid API response: {details}")
            }
            ApiClientError::MalformedUrl(details) => write!(f, "malformed URL: {details}"),
        }
    }
}

impl std::error::Error for ApiClientError {}

// Every successful management call wraps its payload in a `response` key.
#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    response: Value,
}

/// Client for the EdgeStore management REST API.
/// Encapsulates communication with the cluster by exposing a small set of
/// verbs that attach credentials, perform (de)serialization and unwrap the
/// response envelope the API puts around successful payloads.
#[derive(Debug, Clone)]
pub struct EdgeStoreApiClient {
    base_url: String,
    user: String,
    password: String,
    rest_client: Client,
}

impl EdgeStoreApiClient {
    /// Build an API client instance against the configured endpoint.
    pub fn new(config: &DriverConfig) -> Result<Self, ApiClientError> {
        let endpoint = config.endpoint();

        // Make sure the endpoint is a well-formed URL.
        if let Err(error) = Url::parse(&endpoint) {
            return Err(ApiClientError::MalformedUrl(format!(
                "Invalid API endpoint URL {endpoint}: {error:?}"
            )));
        }

        let rest_client = Client::builder()
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .expect("Failed to build REST client");

        debug!("API client is initialized with endpoint {endpoint}");
        Ok(Self {
            base_url: endpoint,
            user: config.rest_user.clone(),
            password: config.rest_password.clone(),
            rest_client,
        })
    }

    /// Management endpoint this client talks to.
    pub fn endpoint(&self) -> &str {
        &self.base_url
    }

    /// GET a path and unwrap the enveloped payload.
    pub async fn get_json(&self, path: &str) -> Result<Value, ApiClientError> {
        let response = self.do_request(Method::GET, path, None::<&()>).await?;
        Self::enveloped_payload(path, response).await
    }

    /// GET a path and deserialize the enveloped payload.
    pub async fn get<R>(&self, path: &str) -> Result<R, ApiClientError>
    where
        for<'a> R: Deserialize<'a>,
    {
        let payload = self.get_json(path).await?;
        serde_json::from_value::<R>(payload).map_err(|error| {
            ApiClientError::InvalidResponse(format!(
                "Failed to deserialize object {}, error = {error}",
                std::any::type_name::<R>(),
            ))
        })
    }

    /// POST a JSON body to a path.
    pub async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<(), ApiClientError> {
        self.do_request(Method::POST, path, Some(body)).await?;
        Ok(())
    }

    /// PUT a JSON body to a path.
    pub async fn put<B: Serialize>(&self, path: &str, body: &B) -> Result<(), ApiClientError> {
        self.do_request(Method::PUT, path, Some(body)).await?;
        Ok(())
    }

    /// DELETE a path, passing the resource coordinates as a JSON body.
    pub async fn delete<B: Serialize>(&self, path: &str, body: &B) -> Result<(), ApiClientError> {
        self.do_request(Method::DELETE, path, Some(body)).await?;
        Ok(())
    }

    // Transform a path into a full URL based on the endpoint.
    fn full_url(&self, path: &str) -> Result<Url, ApiClientError> {
        let url = format!("{}/{}", self.base_url, path);
        Url::parse(&url)
            .map_err(|error| ApiClientError::MalformedUrl(format!("URL parsing error: {error:?}")))
    }

    // Send one request with credentials attached and check the HTTP status.
    async fn do_request<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, ApiClientError> {
        let mut request = self
            .rest_client
            .request(method.clone(), self.full_url(path)?)
            .basic_auth(&self.user, Some(&self.password))
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|error| {
            ApiClientError::ServerCommunication(format!(
                "{method} {path} request failed, error = {error}"
            ))
        })?;

        match response.status() {
            status if status.is_success() => Ok(response),
            status => Err(ApiClientError::GenericOperation(
                status,
                format!("{method} {path} failed"),
            )),
        }
    }

    // Get the response body and unwrap the envelope.
    async fn enveloped_payload(path: &str, response: Response) -> Result<Value, ApiClientError> {
        let body = response.bytes().await.map_err(|error| {
            ApiClientError::InvalidResponse(format!(
                "Failed to obtain body from HTTP response while getting {path}, error = {error}"
            ))
        })?;

        let envelope = serde_json::from_slice::<ResponseEnvelope>(&body).map_err(|error| {
            ApiClientError::InvalidResponse(format!(
                "Unexpected response while getting {path}, error = {error}"
            ))
        })?;
        Ok(envelope.response)
    }
}
