//! Author identity resolution for incoming connections.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use axum::http::{HeaderMap, header};
use serde::Deserialize;
use strokesync_core::AuthorId;

use crate::config::ConfigError;

/// Who a connection speaks for.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub author_id: AuthorId,
    pub display_name: String,
}

/// Resolves a bearer credential to an author.
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, credential: &str) -> Option<Identity>;
}

/// Static table of bearer tokens.
#[derive(Debug, Clone, Default)]
pub struct TokenIdentityProvider {
    tokens: HashMap<String, Identity>,
}

impl TokenIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token: impl Into<String>, identity: Identity) {
        self.tokens.insert(token.into(), identity);
    }

    /// Load `{"<token>": {"authorId": "...", "displayName": "..."}}`.
    pub fn load_file(&mut self, path: &Path) -> Result<usize, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::TokenFileIo {
            path: path.to_path_buf(),
            source,
        })?;
        let table: HashMap<String, Identity> =
            serde_json::from_str(&json).map_err(|source| ConfigError::TokenFileFormat {
                path: path.to_path_buf(),
                source,
            })?;
        // All or nothing: a bad entry leaves the table untouched.
        if table
            .iter()
            .any(|(token, identity)| token.is_empty() || identity.author_id.as_str().is_empty())
        {
            return Err(ConfigError::EmptyIdentity {
                path: path.to_path_buf(),
            });
        }
        let count = table.len();
        self.tokens.extend(table);
        Ok(count)
    }

    /// Add one `TOKEN=AUTHOR_ID:DISPLAY NAME` argument. A missing display
    /// name falls back to the author id.
    pub fn add_arg(&mut self, arg: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidToken(arg.to_string());
        let (token, rest) = arg.split_once('=').ok_or_else(invalid)?;
        let (author, name) = rest.split_once(':').unwrap_or((rest, rest));
        if token.is_empty() || author.is_empty() {
            return Err(invalid());
        }
        let name = if name.is_empty() { author } else { name };
        self.insert(
            token,
            Identity {
                author_id: AuthorId::new(author),
                display_name: name.to_string(),
            },
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl IdentityProvider for TokenIdentityProvider {
    fn resolve(&self, credential: &str) -> Option<Identity> {
        self.tokens.get(credential).cloned()
    }
}

/// Pull the credential from `Authorization: Bearer` or the `token` query
/// parameter. The header wins when both are present.
pub fn credential<'a>(headers: &'a HeaderMap, query: &'a HashMap<String, String>) -> Option<&'a str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .or_else(|| query.get("token").map(String::as_str))
}
