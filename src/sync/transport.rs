use std::time::Duration;

use reqwest::blocking::{Client, Request};
use reqwest::StatusCode;
use thiserror::Error;

use super::SaveRequest;
use crate::config::SyncOptions;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("building HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("sending note to {endpoint}: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} rejected the note with HTTP {status}")]
    Status { endpoint: String, status: StatusCode },
}

/// Delivers one save request to the remote collaborator.
pub trait NoteTransport: Send + 'static {
    fn deliver(&self, request: &SaveRequest) -> Result<(), TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    csrf_header: String,
    request_timeout: Duration,
    beacon_timeout: Duration,
}

impl HttpTransport {
    pub fn new(options: &SyncOptions) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(concat!("notepad/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(TransportError::Client)?;
        Ok(Self {
            client,
            endpoint: options.endpoint.clone(),
            csrf_header: options.csrf_header.clone(),
            request_timeout: options.request_timeout,
            beacon_timeout: options.beacon_timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Builds the POST for `request` without sending it.
    pub fn build_request(&self, request: &SaveRequest) -> Result<Request, TransportError> {
        let timeout = if request.trigger.is_beacon() {
            self.beacon_timeout
        } else {
            self.request_timeout
        };
        let mut builder = self
            .client
            .post(&self.endpoint)
            .timeout(timeout)
            .json(&request.note);
        if let Some(token) = request.csrf_token.as_deref() {
            builder = builder.header(self.csrf_header.as_str(), token);
        }
        builder.build().map_err(|source| TransportError::Request {
            endpoint: self.endpoint.clone(),
            source,
        })
    }
}

impl NoteTransport for HttpTransport {
    fn deliver(&self, request: &SaveRequest) -> Result<(), TransportError> {
        let http_request = self.build_request(request)?;
        let response = self
            .client
            .execute(http_request)
            .map_err(|source| TransportError::Request {
                endpoint: self.endpoint.clone(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                endpoint: self.endpoint.clone(),
                status,
            });
        }
        tracing::debug!(
            endpoint = %self.endpoint,
            %status,
            trigger = %request.trigger,
            "note delivered"
        );
        Ok(())
    }
}
