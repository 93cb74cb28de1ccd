use thiserror::Error;
use tracing::{info, warn};

use crate::api::{ApiClient, ApiError, AuthResponse, Credentials};
use crate::models::{Role, User};
use crate::push::{ConnectionManager, PushTransport};
use crate::validation::{validate_login, ValidationError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("not signed in")]
    NotAuthenticated,
    #[error("signed in as {actual}, which may not use this command")]
    Unauthorized { actual: Role },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Checks that a signed-in user holds one of `allowed`.
pub fn authorize<'a>(user: Option<&'a User>, allowed: &[Role]) -> Result<&'a User, SessionError> {
    let user = user.ok_or(SessionError::NotAuthenticated)?;
    if allowed.contains(&user.role) {
        Ok(user)
    } else {
        Err(SessionError::Unauthorized { actual: user.role })
    }
}

/// An authenticated user together with the push connection owned on their
/// behalf. The connection is opened when the session is established and torn
/// down on logout.
pub struct Session<T: PushTransport> {
    api: ApiClient,
    push: ConnectionManager<T>,
    user: Option<User>,
}

impl<T: PushTransport> Session<T> {
    pub fn new(api: ApiClient, push: ConnectionManager<T>) -> Self {
        Self {
            api,
            push,
            user: None,
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn push(&mut self) -> &mut ConnectionManager<T> {
        &mut self.push
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn require(&self, allowed: &[Role]) -> Result<&User, SessionError> {
        authorize(self.user.as_ref(), allowed)
    }

    pub async fn login(&mut self, credentials: &Credentials) -> Result<&User, SessionError> {
        validate_login(&credentials.email, &credentials.password)?;
        let auth = self.api.login(credentials).await?;
        Ok(self.establish(auth).await)
    }

    /// Resumes a session from the server's cookie, if it still holds one.
    pub async fn restore(&mut self) -> Result<&User, SessionError> {
        match self.api.verify().await {
            Ok(auth) => Ok(self.establish(auth).await),
            Err(err) if err.is_unauthorized() => Err(SessionError::NotAuthenticated),
            Err(err) => Err(err.into()),
        }
    }

    /// Records the user and opens the push channel. A push failure leaves the
    /// session signed in without live updates.
    pub(crate) async fn establish(&mut self, auth: AuthResponse) -> &User {
        let credential = auth.token.unwrap_or_else(|| auth.user.id.clone());
        info!(user = %auth.user.email, role = auth.user.role.as_str(), "signed in");
        if let Err(err) = self.push.connect(&credential).await {
            warn!(error = %err, "continuing without live updates");
        }
        self.user.insert(auth.user)
    }

    /// Signs out locally even when the server call fails.
    pub async fn logout(&mut self) {
        if self.user.is_none() {
            self.push.disconnect().await;
            return;
        }
        if let Err(err) = self.api.logout().await {
            warn!(error = %err, "logout request failed, clearing session anyway");
        }
        self.user = None;
        self.push.disconnect().await;
    }
}
