use std::collections::HashMap;

use serde::Deserialize;

use super::endpoints::Link;
use super::CrestHttp;
use crate::error::SessionError;

/// The authenticated character resource.
#[derive(Debug, Clone, Deserialize)]
pub struct CharacterDocument {
    pub name: String,
    #[serde(default)]
    pub portrait: HashMap<String, Link>,
    pub location: Option<Link>,
}

impl CharacterDocument {
    pub fn portrait_href(&self, size: &str) -> Result<&str, SessionError> {
        self.portrait
            .get(size)
            .map(|link| link.href.as_str())
            .ok_or_else(|| SessionError::Protocol(format!("character has no {size} portrait")))
    }
}

pub async fn fetch_character(
    http: &CrestHttp,
    character_url: &str,
    authorization: &str,
) -> Result<CharacterDocument, SessionError> {
    http.get_json(character_url, Some(authorization)).await
}

/// Resolve the portrait relation of the given size and download the image.
pub async fn fetch_portrait(
    http: &CrestHttp,
    character_url: &str,
    authorization: &str,
    size: &str,
) -> Result<Vec<u8>, SessionError> {
    let character = fetch_character(http, character_url, authorization).await?;
    let href = character.portrait_href(size)?;
    http.get_bytes(href).await
}
