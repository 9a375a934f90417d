use std::{future::Future, time::Duration};

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    account::{LoginRequest, LoginResponse, PasswordUpdateRequest},
    config::ClientConfig,
    create::NewMemberPayload,
    edit::MemberUpdate,
    member::{Member, MemberId, Ministry},
};

const LOGIN_PATH: &str = "/auth/login";
const UPDATE_PASSWORD_PATH: &str = "/auth/update-password";
const MINISTRIES_PATH: &str = "/ministerios";
const MEMBERS_PATH: &str = "/miembros-universal";
const CREATE_MEMBER_PATH: &str = "/miembros";

pub const CONNECTION_ERROR_MESSAGE: &str = "Error de conexión con el servidor";
pub const CANCELLED_MESSAGE: &str = "Operación cancelada";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Could not reach the backend")]
    Connection(#[from] reqwest::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request was cancelled")]
    Cancelled,

    #[error("Backend answered with status {status}")]
    Status { status: u16, message: Option<String> },

    #[error("Backend response could not be decoded")]
    Decode(#[from] serde_json::Error),
}

impl GatewayError {
    /// Text to show the user. Transport problems get the generic connection
    /// message; rejected requests use the server's message when it sent one.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            Self::Connection(_) | Self::Timeout(_) => CONNECTION_ERROR_MESSAGE.to_string(),
            Self::Cancelled => CANCELLED_MESSAGE.to_string(),
            Self::Status {
                message: Some(message),
                ..
            } => message.clone(),
            Self::Status { message: None, .. } | Self::Decode(_) => fallback.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ChurchClientNewError {
    #[error("Failed to build the HTTP client")]
    Build(#[from] reqwest::Error),
}

/// Pull `error` or `mensaje` out of a JSON error body
pub fn server_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;

    ["error", "mensaje"]
        .iter()
        .find_map(|key| value.get(key)?.as_str())
        .map(str::to_string)
}

/// Race a gateway call against the dialog's cancellation token
pub async fn guarded<F, T>(cancel: &CancellationToken, request: F) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GatewayError::Cancelled),
        result = request => result,
    }
}

/// The backend REST API
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, GatewayError>;

    async fn update_password(
        &self,
        token: &str,
        request: &PasswordUpdateRequest,
    ) -> Result<(), GatewayError>;

    async fn list_ministries(&self, token: &str) -> Result<Vec<Ministry>, GatewayError>;

    async fn list_members(&self, token: &str) -> Result<Vec<Member>, GatewayError>;

    async fn update_member(
        &self,
        token: &str,
        id: MemberId,
        update: &MemberUpdate,
    ) -> Result<(), GatewayError>;

    async fn create_member(
        &self,
        token: &str,
        payload: &NewMemberPayload,
    ) -> Result<(), GatewayError>;

    /// Soft delete: the backend marks the member inactive
    async fn delete_member(&self, token: &str, id: MemberId) -> Result<(), GatewayError>;
}

/// HTTP implementation of [`Gateway`]
#[derive(Debug, Clone)]
pub struct ChurchClient {
    http: Client,
    config: ClientConfig,
}

impl ChurchClient {
    pub fn new(config: ClientConfig) -> Result<Self, ChurchClientNewError> {
        let http = Client::builder().timeout(config.timeout).build()?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn request(&self, method: reqwest::Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let request = self.http.request(method, self.config.endpoint(path));

        match token {
            Some(token) => request.header(header::AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        }
    }

    /// Send a request and return the body of a successful response
    async fn send(&self, request: RequestBuilder) -> Result<String, GatewayError> {
        let timeout = self.config.timeout;

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, body) = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| GatewayError::Timeout(timeout))?
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(timeout)
                } else {
                    GatewayError::Connection(e)
                }
            })?;

        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), "Backend rejected request: {}", body);
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message: server_message(&body),
            });
        }

        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, GatewayError> {
        let body = self.send(request).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl Gateway for ChurchClient {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, GatewayError> {
        let request = self.request(reqwest::Method::POST, LOGIN_PATH, None).json(request);
        self.send_json(request).await
    }

    async fn update_password(
        &self,
        token: &str,
        request: &PasswordUpdateRequest,
    ) -> Result<(), GatewayError> {
        let request = self
            .request(reqwest::Method::PUT, UPDATE_PASSWORD_PATH, Some(token))
            .json(request);
        self.send(request).await.map(drop)
    }

    async fn list_ministries(&self, token: &str) -> Result<Vec<Ministry>, GatewayError> {
        let request = self.request(reqwest::Method::GET, MINISTRIES_PATH, Some(token));
        self.send_json(request).await
    }

    async fn list_members(&self, token: &str) -> Result<Vec<Member>, GatewayError> {
        let request = self.request(reqwest::Method::GET, MEMBERS_PATH, Some(token));
        self.send_json(request).await
    }

    async fn update_member(
        &self,
        token: &str,
        id: MemberId,
        update: &MemberUpdate,
    ) -> Result<(), GatewayError> {
        let path = format!("{}/{}", MEMBERS_PATH, id);
        let request = self
            .request(reqwest::Method::PUT, &path, Some(token))
            .json(update);
        self.send(request).await.map(drop)
    }

    async fn create_member(
        &self,
        token: &str,
        payload: &NewMemberPayload,
    ) -> Result<(), GatewayError> {
        let request = self
            .request(reqwest::Method::POST, CREATE_MEMBER_PATH, Some(token))
            .json(payload);
        self.send(request).await.map(drop)
    }

    async fn delete_member(&self, token: &str, id: MemberId) -> Result<(), GatewayError> {
        let path = format!("{}/{}", CREATE_MEMBER_PATH, id);
        let request = self.request(reqwest::Method::DELETE, &path, Some(token));
        self.send(request).await.map(drop)
    }
}
