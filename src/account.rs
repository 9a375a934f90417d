//! Sign-in and password change

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    client::{Gateway, GatewayError},
    session::{Role, Session, SessionContext, UserId},
    storage::StoreError,
};

pub const PASSWORD_UPDATED_MESSAGE: &str = "¡Contraseña actualizada con éxito!";
const PASSWORD_UPDATE_FALLBACK: &str = "Error al actualizar";
const INVALID_CREDENTIALS_MESSAGE: &str = "Usuario o contraseña incorrectos";

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "contraseña")]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginUser {
    pub id: UserId,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "rol")]
    pub role: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(rename = "mensaje", default)]
    pub message: Option<String>,
    pub token: String,
    #[serde(rename = "usuario")]
    pub user: LoginUser,
}

impl From<LoginResponse> for Session {
    fn from(response: LoginResponse) -> Self {
        Session {
            id: response.user.id,
            name: response.user.name,
            role: Role::parse(&response.user.role),
            token: response.token,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordUpdateRequest {
    pub password_actual: String,
    pub nueva_password: String,
    pub confirmar_password: String,
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Usuario o contraseña incorrectos")]
    InvalidCredentials,

    #[error("La nueva contraseña y la confirmación no coinciden.")]
    PasswordMismatch,

    #[error("No active session")]
    NotAuthenticated,

    #[error("{message}")]
    Rejected {
        message: String,
        #[source]
        source: GatewayError,
    },

    #[error("Failed to persist the session")]
    Store(#[from] StoreError),
}

/// Authenticate and make the returned session current
pub async fn login(
    gateway: &dyn Gateway,
    context: &mut SessionContext,
    name: &str,
    password: &str,
) -> Result<Session, AccountError> {
    let request = LoginRequest {
        name: name.to_string(),
        password: password.to_string(),
    };

    let response = match gateway.login(&request).await {
        Ok(response) => response,
        Err(GatewayError::Status { status, .. }) => {
            tracing::info!(status, "Login rejected");
            return Err(AccountError::InvalidCredentials);
        }
        Err(e) => {
            tracing::error!("Login failed: {}", e);
            return Err(AccountError::Rejected {
                message: e.user_message(INVALID_CREDENTIALS_MESSAGE),
                source: e,
            });
        }
    };

    let session = Session::from(response);
    context.establish(session.clone())?;

    Ok(session)
}

/// The password change form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasswordForm {
    pub current: String,
    pub new: String,
    pub confirm: String,
}

impl PasswordForm {
    pub fn validate(&self) -> Result<(), AccountError> {
        if self.new != self.confirm {
            return Err(AccountError::PasswordMismatch);
        }
        Ok(())
    }

    /// Submit the change. The form is cleared only when the backend accepts it.
    pub async fn submit(
        &mut self,
        gateway: &dyn Gateway,
        context: &SessionContext,
    ) -> Result<&'static str, AccountError> {
        self.validate()?;

        let token = context.token().ok_or(AccountError::NotAuthenticated)?;
        let request = PasswordUpdateRequest {
            password_actual: self.current.clone(),
            nueva_password: self.new.clone(),
            confirmar_password: self.confirm.clone(),
        };

        if let Err(e) = gateway.update_password(token, &request).await {
            tracing::warn!("Password update failed: {}", e);
            return Err(AccountError::Rejected {
                message: e.user_message(PASSWORD_UPDATE_FALLBACK),
                source: e,
            });
        }

        *self = Self::default();
        Ok(PASSWORD_UPDATED_MESSAGE)
    }
}
