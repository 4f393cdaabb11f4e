use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::Credentials;
use crate::crest::CrestHttp;
use crate::error::SessionError;

/// What is traded at the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    AuthorizationCode(String),
    RefreshToken(String),
}

impl Grant {
    fn form(&self) -> [(&'static str, &str); 2] {
        match self {
            Self::AuthorizationCode(code) => [("grant_type", "authorization_code"), ("code", code)],
            Self::RefreshToken(token) => [("grant_type", "refresh_token"), ("refresh_token", token)],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
}

/// POST the grant to the token endpoint with Basic client authentication.
///
/// A 400/401 means the grant or client credentials were refused and is not
/// worth retrying. An authorization-code response without a refresh token is
/// a protocol error.
pub async fn exchange_token(
    http: &CrestHttp,
    token_url: &str,
    credentials: &Credentials,
    grant: &Grant,
) -> Result<TokenResponse, SessionError> {
    let resp = http
        .client()
        .post(token_url)
        .header("Authorization", credentials.basic_authorization())
        .header("Accept", "application/json")
        .form(&grant.form())
        .send()
        .await?;
    let status = resp.status();
    if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
        return Err(SessionError::GrantRejected {
            status: status.as_u16(),
        });
    }
    if !status.is_success() {
        return Err(SessionError::Protocol(format!(
            "token endpoint returned status {status}"
        )));
    }
    let body = resp.bytes().await?;
    let token: TokenResponse = serde_json::from_slice(&body)?;
    if matches!(grant, Grant::AuthorizationCode(_)) && token.refresh_token.is_none() {
        return Err(SessionError::Protocol(
            "token response is missing refresh_token".to_string(),
        ));
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_form_parameters() {
        assert_eq!(
            Grant::AuthorizationCode("abc".into()).form(),
            [("grant_type", "authorization_code"), ("code", "abc")]
        );
        assert_eq!(
            Grant::RefreshToken("r".into()).form(),
            [("grant_type", "refresh_token"), ("refresh_token", "r")]
        );
    }

    #[test]
    fn token_response_refresh_token_is_optional() {
        let token: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","token_type":"Bearer","expires_in":1200}"#)
                .unwrap();
        assert_eq!(token.access_token, "a");
        assert!(token.refresh_token.is_none());
        assert_eq!(token.expires_in, 1200);
    }
}
