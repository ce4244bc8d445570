//! HTTP client for the remote suggestion service.
//!
//! Every operation is a `POST {base_url}/{operation}` with a
//! `multipart/form-data` body and a JSON answer.  All connection details come
//! from [`GatewayConfig`]; nothing is hardcoded.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;

use super::error::TransportError;
use super::wire::{
    EndResponse, Operation, SelectRequest, SelectResponse, StartRequest, StartResponse,
    VoiceResponse, AUDIO_FILE_NAME, AUDIO_MIME,
};
use super::SuggestionGateway;
use crate::audio::AudioClip;
use crate::config::GatewayConfig;

/// [`SuggestionGateway`] backed by the remote service.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    /// Build a gateway from config.
    ///
    /// The client carries the per-request timeout; a default client is used
    /// if the builder fails.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, operation: Operation) -> String {
        format!("{}/{}", self.base_url, operation.path())
    }

    async fn post<T: DeserializeOwned>(
        &self,
        operation: Operation,
        form: Form,
    ) -> Result<T, TransportError> {
        let url = self.url(operation);
        log::debug!("gateway: POST {url}");

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(operation, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::from_reqwest(operation, e))?;

        if !status.is_success() {
            log::warn!("gateway: {operation} answered {status}: {body}");
            return Err(TransportError::Status {
                operation,
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| TransportError::Decode {
            operation,
            message: e.to_string(),
            body,
        })
    }
}

#[async_trait]
impl SuggestionGateway for HttpGateway {
    async fn start(&self, request: &StartRequest) -> Result<StartResponse, TransportError> {
        let mut form = Form::new().text("context", request.context.clone());
        if let Some(role) = &request.role {
            form = form.text("role", role.clone());
        }
        self.post(Operation::Start, form).await
    }

    async fn voice(&self, clip: &AudioClip) -> Result<VoiceResponse, TransportError> {
        let part = Part::bytes(clip.bytes.clone())
            .file_name(AUDIO_FILE_NAME)
            .mime_str(AUDIO_MIME)
            .map_err(|e| TransportError::from_reqwest(Operation::Voice, e))?;
        self.post(Operation::Voice, Form::new().part("file", part))
            .await
    }

    async fn select(&self, request: &SelectRequest) -> Result<SelectResponse, TransportError> {
        let form = Form::new().text("choice", request.choice.clone());
        self.post(Operation::Select, form).await
    }

    async fn end(&self) -> Result<EndResponse, TransportError> {
        self.post(Operation::End, Form::new()).await
    }
}
