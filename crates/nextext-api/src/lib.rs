pub mod config;
pub mod error;
pub mod rest;
pub mod session;

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use rest::RestClient;
pub use session::{Credential, CredentialStore, FileCredentialStore, MemoryCredentialStore, Session};
