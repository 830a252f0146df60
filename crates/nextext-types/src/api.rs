use serde::{Deserialize, Serialize};

// -- Auth --

/// Sent form-encoded to `POST /users/login`.
#[derive(Debug, Serialize)]
pub struct LoginForm<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Sent as JSON to `POST /users/register`.
#[derive(Debug, Serialize)]
pub struct RegisterRequest<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

// -- Users --

/// Query string for `GET /users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserQuery {
    pub skip: u32,
    pub limit: u32,
    /// Free-text filter, matched server-side as a case-insensitive substring.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
}

impl Default for UserQuery {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: 10,
            q: None,
        }
    }
}

// -- Errors --

/// Error body returned by the backend. `detail` is either a plain string or a
/// list of validation items.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    Text(String),
    Items(Vec<ValidationItem>),
    Other(serde_json::Value),
}

#[derive(Debug, Deserialize)]
pub struct ValidationItem {
    /// Usually a string, but taken as whatever JSON the backend sent.
    #[serde(default)]
    pub msg: serde_json::Value,
}

impl ValidationItem {
    /// `msg` as display text: strings as-is, a missing or null `msg` as
    /// empty, anything else in its JSON form.
    pub fn text(&self) -> String {
        match &self.msg {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}
