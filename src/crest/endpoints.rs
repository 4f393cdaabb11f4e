//! HATEOAS endpoint discovery.
//!
//! Nothing past the public root URL is hardcoded: every hop re-reads the
//! `href` of a named relation from the previous response.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use super::CrestHttp;
use crate::error::SessionError;

pub const DECODE: &str = "decode";
pub const CHARACTER: &str = "char";
pub const LOCATION: &str = "location";
pub const AUTH_ENDPOINT: &str = "authEndpoint";

/// `{"href": "..."}` relation object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Link {
    pub href: String,
}

/// Relation name to absolute URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointTable {
    relations: HashMap<String, String>,
}

impl EndpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every top-level member of the form `{"href": "<string>"}`.
    pub fn from_document(document: &Value) -> Result<Self, SessionError> {
        let object = document.as_object().ok_or_else(|| {
            SessionError::Discovery("public endpoint document is not a JSON object".to_string())
        })?;
        let relations = object
            .iter()
            .filter_map(|(name, value)| {
                let href = value.get("href")?.as_str()?;
                Some((name.clone(), href.to_string()))
            })
            .collect();
        Ok(Self { relations })
    }

    pub fn get(&self, relation: &str) -> Option<&str> {
        self.relations.get(relation).map(String::as_str)
    }

    pub fn contains(&self, relation: &str) -> bool {
        self.relations.contains_key(relation)
    }

    pub fn insert(&mut self, relation: impl Into<String>, href: impl Into<String>) {
        self.relations.insert(relation.into(), href.into());
    }

    pub fn remove(&mut self, relation: &str) -> Option<String> {
        self.relations.remove(relation)
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

/// URLs discovered through the authenticated decode hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedEndpoints {
    pub character: String,
    pub location: String,
}

#[derive(Debug, Deserialize)]
struct DecodeDocument {
    character: Link,
}

#[derive(Debug, Deserialize)]
struct CharacterLocationLink {
    location: Link,
}

/// Walks the public root, then the decode and character documents.
#[derive(Debug, Clone)]
pub struct EndpointResolver {
    http: CrestHttp,
    public_url: String,
    table: EndpointTable,
}

impl EndpointResolver {
    pub fn new(http: CrestHttp, public_url: impl Into<String>) -> Self {
        Self {
            http,
            public_url: public_url.into(),
            table: EndpointTable::new(),
        }
    }

    /// Start from an already known table (e.g. one restored by a collaborator).
    pub fn with_table(mut self, table: EndpointTable) -> Self {
        self.table = table;
        self
    }

    pub fn table(&self) -> &EndpointTable {
        &self.table
    }

    pub fn get(&self, relation: &str) -> Option<&str> {
        self.table.get(relation)
    }

    /// One unauthenticated GET of the public root, replacing the table.
    pub async fn load_public_endpoints(&mut self) -> Result<&EndpointTable, SessionError> {
        tracing::debug!(url = %self.public_url, "Loading public endpoints");
        let document: Value = self
            .http
            .get_json(&self.public_url, None)
            .await
            .map_err(|e| match e {
                SessionError::Protocol(message) => SessionError::Discovery(message),
                other => other,
            })?;
        self.table = EndpointTable::from_document(&document)?;
        tracing::debug!(relations = self.table.len(), "Public endpoints loaded");
        Ok(&self.table)
    }

    /// Follow decode → character → location with the given bearer header.
    ///
    /// Reloads the public table first when the `decode` relation is missing.
    pub async fn resolve_authenticated_endpoints(
        &mut self,
        authorization: &str,
    ) -> Result<AuthenticatedEndpoints, SessionError> {
        if !self.table.contains(DECODE) {
            tracing::debug!("Decode relation missing, reloading public endpoints");
            self.load_public_endpoints().await?;
        }
        let decode_url = self
            .table
            .get(DECODE)
            .ok_or_else(|| {
                SessionError::Discovery("public endpoints have no decode relation".to_string())
            })?
            .to_string();

        let decode: DecodeDocument = self.http.get_json(&decode_url, Some(authorization)).await?;
        let character_url = decode.character.href;
        self.table.insert(CHARACTER, character_url.clone());

        let character: CharacterLocationLink = self
            .http
            .get_json(&character_url, Some(authorization))
            .await?;
        let location_url = character.location.href;
        self.table.insert(LOCATION, location_url.clone());

        Ok(AuthenticatedEndpoints {
            character: character_url,
            location: location_url,
        })
    }

    /// Forget the per-character relations discovered after login.
    pub fn clear_authenticated(&mut self) {
        self.table.remove(CHARACTER);
        self.table.remove(LOCATION);
    }
}
