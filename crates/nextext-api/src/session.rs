//! Session store: the bearer credential and the identity it belongs to.
//!
//! A [`Session`] is an explicit context object. Clones share state, and it is
//! the only place the credential is ever mutated; the REST client and the
//! channel manager only read it.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde_json::{Map, Value};
use tracing::{info, warn};

use nextext_types::models::Identity;

use crate::error::{ClientError, Result};

/// Well-known key the credential is persisted under.
pub const CREDENTIAL_KEY: &str = "nextext_token";

/// Opaque bearer token. `Debug` is redacted so it never ends up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Durable storage for the credential across process restarts.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<String>>;
    fn save(&self, token: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Stores the credential in a small JSON document, under [`CREDENTIAL_KEY`].
/// Other keys in the document are left alone.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_document(&self) -> Result<Map<String, Value>> {
        match std::fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(Map::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                ClientError::Storage(format!("corrupt store {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(ClientError::Storage(format!("read {}: {}", self.path.display(), e))),
        }
    }

    fn write_document(&self, doc: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ClientError::Storage(format!("create {}: {}", parent.display(), e)))?;
        }
        let bytes = serde_json::to_vec_pretty(doc)
            .map_err(|e| ClientError::Storage(e.to_string()))?;
        std::fs::write(&self.path, bytes)
            .map_err(|e| ClientError::Storage(format!("write {}: {}", self.path.display(), e)))
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<String>> {
        let doc = self.read_document()?;
        Ok(doc
            .get(CREDENTIAL_KEY)
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string))
    }

    fn save(&self, token: &str) -> Result<()> {
        let mut doc = self.read_document()?;
        doc.insert(CREDENTIAL_KEY.to_string(), Value::String(token.to_string()));
        self.write_document(&doc)
    }

    fn clear(&self) -> Result<()> {
        let mut doc = self.read_document()?;
        if doc.remove(CREDENTIAL_KEY).is_some() {
            self.write_document(&doc)?;
        }
        Ok(())
    }
}

/// Process-local store; nothing survives a restart.
#[derive(Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.token.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, token: &str) -> Result<()> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

#[derive(Default)]
struct SessionState {
    credential: Option<Credential>,
    identity: Option<Identity>,
}

#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    store: Box<dyn CredentialStore>,
    state: RwLock<SessionState>,
}

impl Session {
    /// Open a session over `store`, picking up any persisted credential.
    pub fn open(store: Box<dyn CredentialStore>) -> Result<Self> {
        let credential = store.load()?.map(Credential::new);
        if credential.is_some() {
            info!("Restored persisted credential");
        }

        Ok(Self {
            inner: Arc::new(SessionInner {
                store,
                state: RwLock::new(SessionState {
                    credential,
                    identity: None,
                }),
            }),
        })
    }

    /// Persist and install a new credential. The previous identity is
    /// forgotten and must be fetched again.
    pub fn set_credential(&self, credential: Credential) -> Result<()> {
        self.inner.store.save(credential.expose())?;
        let mut state = self.inner.state.write().unwrap_or_else(PoisonError::into_inner);
        state.credential = Some(credential);
        state.identity = None;
        info!("Credential installed");
        Ok(())
    }

    /// Drop the credential and identity. In-memory state is cleared even if
    /// the durable store fails.
    pub fn clear_credential(&self) -> Result<()> {
        {
            let mut state = self.inner.state.write().unwrap_or_else(PoisonError::into_inner);
            state.credential = None;
            state.identity = None;
        }
        info!("Credential cleared");
        self.inner.store.clear().inspect_err(|e| {
            warn!("Failed to clear persisted credential: {}", e);
        })
    }

    pub fn credential(&self) -> Option<Credential> {
        self.read().credential.clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.read().identity.clone()
    }

    /// Record the identity for the current credential. Ignored when no
    /// credential is installed (a logout raced the fetch).
    pub fn set_identity(&self, identity: Identity) {
        let mut state = self.inner.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.credential.is_some() {
            state.identity = Some(identity);
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().credential.is_some()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SessionState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}
