use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use nextext_types::api::{LoginForm, RegisterRequest, TokenResponse, UserQuery};
use nextext_types::models::{ConversationPartner, Identity, Message, UserId};

use crate::config::ClientConfig;
use crate::error::{ClientError, LOGIN_FAILED, REGISTRATION_FAILED, Result, display_message};
use crate::session::{Credential, Session};

const IDENTITY_FAILED: &str = "Could not validate credentials";

/// Credentialed HTTP calls against the chat backend.
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    config: ClientConfig,
    session: Session,
}

impl RestClient {
    pub fn new(config: ClientConfig, session: Session) -> Self {
        Self {
            http: Client::new(),
            config,
            session,
        }
    }

    /// Exchange username/password for a credential. Does not install it.
    pub async fn login(&self, username: &str, password: &str) -> Result<Credential> {
        let resp = self
            .http
            .post(self.config.endpoint("/users/login"))
            .form(&LoginForm { username, password })
            .send()
            .await
            .map_err(|e| {
                warn!("Login request failed: {}", e);
                ClientError::Auth(LOGIN_FAILED.into())
            })?;

        let resp = reject_status(resp, ClientError::Auth, LOGIN_FAILED).await?;
        let token: TokenResponse = resp.json().await.map_err(|e| {
            warn!("Malformed login response: {}", e);
            ClientError::Auth(LOGIN_FAILED.into())
        })?;

        info!("{} logged in", username);
        Ok(Credential::new(token.access_token))
    }

    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<()> {
        let resp = self
            .http
            .post(self.config.endpoint("/users/register"))
            .json(&RegisterRequest {
                username,
                email,
                password,
            })
            .send()
            .await
            .map_err(|e| {
                warn!("Register request failed: {}", e);
                ClientError::Auth(REGISTRATION_FAILED.into())
            })?;

        reject_status(resp, ClientError::Auth, REGISTRATION_FAILED).await?;
        info!("Registered {}", username);
        Ok(())
    }

    /// Every failure here is an [`ClientError::Auth`]: the caller is expected
    /// to clear the session.
    pub async fn fetch_current_identity(&self) -> Result<Identity> {
        let resp = self
            .authorized(self.http.get(self.config.endpoint("/users/me")))?
            .send()
            .await
            .map_err(|e| {
                warn!("Identity request failed: {}", e);
                ClientError::Auth(IDENTITY_FAILED.into())
            })?;

        let resp = reject_status(resp, ClientError::Auth, IDENTITY_FAILED).await?;
        resp.json().await.map_err(|e| {
            warn!("Malformed identity response: {}", e);
            ClientError::Auth(IDENTITY_FAILED.into())
        })
    }

    pub async fn list_users(&self, query: &UserQuery) -> Result<Vec<ConversationPartner>> {
        let req = self
            .authorized(self.http.get(self.config.endpoint("/users")))?
            .query(query);
        self.fetch_json(req).await
    }

    /// Look a partner up by id through the user search. An empty result
    /// yields [`ConversationPartner::placeholder`] rather than an error.
    pub async fn resolve_partner(&self, partner_id: UserId) -> Result<ConversationPartner> {
        let query = UserQuery {
            skip: 0,
            limit: 1,
            q: Some(partner_id.to_string()),
        };
        let found = self.list_users(&query).await?;
        Ok(found.into_iter().next().unwrap_or_else(|| {
            debug!("No user matched {}, using placeholder", partner_id);
            ConversationPartner::placeholder(partner_id)
        }))
    }

    /// Full history with `partner_id`, oldest first.
    pub async fn fetch_history(&self, partner_id: UserId) -> Result<Vec<Message>> {
        let req = self.authorized(
            self.http
                .get(self.config.endpoint(&format!("/chat/history/{}", partner_id))),
        )?;
        let history: Vec<Message> = self.fetch_json(req).await?;
        debug!("Fetched {} messages with {}", history.len(), partner_id);
        Ok(history)
    }

    /// Attach the current credential, or refuse before anything is sent.
    fn authorized(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        let credential = self.session.credential().ok_or(ClientError::Unauthenticated)?;
        Ok(req.bearer_auth(credential.expose()))
    }

    async fn fetch_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        let resp = req
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        let resp = reject_status(resp, ClientError::Network, "request failed").await?;
        resp.json()
            .await
            .map_err(|e| ClientError::Network(format!("malformed response: {}", e)))
    }
}

/// Pass successful responses through; turn anything else into `make_err`
/// with the body's normalized detail.
async fn reject_status(
    resp: Response,
    make_err: impl FnOnce(String) -> ClientError,
    fallback: &str,
) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.bytes().await.unwrap_or_default();
    let message = display_message(&body, fallback);
    warn!("{} -> {}", status, message);
    Err(make_err(message))
}
