use tracing::{info, warn};

use nextext_api::error::REGISTRATION_FAILED;
use nextext_api::{
    ClientConfig, ClientError, CredentialStore, FileCredentialStore, RestClient, Result, Session,
};
use nextext_gateway::{ChannelManager, Conversation};
use nextext_types::api::UserQuery;
use nextext_types::models::{Identity, UserId};

use crate::contacts::ContactList;
use crate::view::ConversationView;

/// Entry point for a front-end: authentication, contacts and conversations
/// for one session.
///
/// Every async entry point reports failure through its `Result`; the ones
/// that fetch conversation data also end the session on failure.
pub struct ChatClient {
    session: Session,
    rest: RestClient,
    channel: ChannelManager,
}

impl ChatClient {
    pub fn new(config: ClientConfig, store: Box<dyn CredentialStore>) -> Result<Self> {
        let session = Session::open(store)?;
        let rest = RestClient::new(config.clone(), session.clone());
        let channel = ChannelManager::new(config, session.clone());
        Ok(Self {
            session,
            rest,
            channel,
        })
    }

    /// Persist the credential in the file named by the config.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let store = FileCredentialStore::new(config.credential_path.clone());
        Self::new(config, Box::new(store))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    pub fn channel(&self) -> &ChannelManager {
        &self.channel
    }

    pub fn identity(&self) -> Option<Identity> {
        self.session.identity()
    }

    /// Resume a persisted session by fetching its identity. `Ok(None)` when
    /// there is nothing to resume.
    pub async fn restore(&self) -> Result<Option<Identity>> {
        if !self.session.is_authenticated() {
            return Ok(None);
        }
        self.refresh_identity().await.map(Some)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Identity> {
        let credential = self.rest.login(username, password).await?;
        // the open channel, if any, belongs to the previous credential
        self.channel.close().await;
        self.session.set_credential(credential)?;
        self.refresh_identity().await
    }

    /// Register, then log straight in with the same username and password.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<Identity> {
        self.rest.register(username, email, password).await?;
        self.login(username, password).await.map_err(|e| {
            warn!("Login after registering {} failed: {}", username, e);
            ClientError::Auth(REGISTRATION_FAILED.into())
        })
    }

    /// Close the channel and forget the credential and identity.
    pub async fn logout(&self) {
        self.channel.close().await;
        // already logged by the session
        let _ = self.session.clear_credential();
        info!("Logged out");
    }

    pub async fn contacts(&self) -> Result<ContactList> {
        let me = self.require_identity()?;
        let users = self
            .end_session_on_error(self.rest.list_users(&UserQuery::default()).await)
            .await?;
        Ok(ContactList::new(users, me.id))
    }

    /// Enter the conversation with `partner_id`.
    ///
    /// The live subscription is registered before the channel connects and
    /// before history is requested, so nothing that arrives meanwhile is lost;
    /// it queues and is merged after the history seed. A channel failure only
    /// costs live updates; a partner or history failure ends the session.
    pub async fn open_conversation(&self, partner_id: UserId) -> Result<ConversationView> {
        let me = self.require_identity()?;
        let subscription = self.channel.subscribe(me.id, partner_id);

        if let Err(e) = self.channel.connect().await {
            warn!("Conversation with {} has no live updates: {}", partner_id, e);
        }

        let partner = self
            .end_session_on_error(self.rest.resolve_partner(partner_id).await)
            .await?;
        let history = self
            .end_session_on_error(self.rest.fetch_history(partner_id).await)
            .await?;

        let mut conversation = Conversation::new(me, partner);
        conversation.seed_history(history);
        info!(
            "Opened conversation with {} ({} messages)",
            conversation.partner().username,
            conversation.timeline().len()
        );

        Ok(ConversationView::new(conversation, subscription, self.channel.clone()))
    }

    fn require_identity(&self) -> Result<Identity> {
        self.session.identity().ok_or(ClientError::Unauthenticated)
    }

    async fn refresh_identity(&self) -> Result<Identity> {
        match self.rest.fetch_current_identity().await {
            Ok(identity) => {
                self.session.set_identity(identity.clone());
                info!("Signed in as {} ({})", identity.username, identity.id);
                Ok(identity)
            }
            Err(e) => {
                warn!("Identity fetch failed, clearing session: {}", e);
                self.logout().await;
                Err(e)
            }
        }
    }

    async fn end_session_on_error<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            warn!("Session data fetch failed, logging out: {}", e);
            self.logout().await;
        }
        result
    }
}
