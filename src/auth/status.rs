use serde::Serialize;
use strum::{Display, EnumIter};

/// Authentication / session progress, published to observers.
///
/// `Display` yields the human-readable label shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    #[strum(to_string = "Waiting for instruction")]
    Blank,
    #[strum(to_string = "Waiting for login credentials")]
    WaitingForCredentials,
    #[strum(to_string = "Collecting URLs for public endpoints")]
    ObtainingPublicEndpoints,
    #[strum(to_string = "Authenticating via refresh token")]
    AuthenticatingViaRefreshToken,
    #[strum(to_string = "Waiting for SSO web login")]
    WaitingForHttpResponse,
    #[strum(to_string = "Collecting URLs for authenticated endpoints")]
    ObtainingAuthenticatedEndpoints,
    #[strum(to_string = "Getting character name")]
    GettingCharacterName,
    #[strum(to_string = "Getting character portrait")]
    GettingCharacterPortrait,
    #[strum(to_string = "Getting character position")]
    GettingCharacterPosition,
    #[strum(to_string = "Authenticated and connected")]
    Connected,
    #[strum(to_string = "Error")]
    Error,
}
