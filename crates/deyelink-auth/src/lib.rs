//! Deyelink Auth - Account linking and bearer token verification
//!
//! Implements the authorization-code flow the smart-home platform uses to link
//! a user's cloud account, and the verifier that guards fulfillment requests.
//!
//! # Linking Flow
//!
//! 1. The platform sends the user to `GET /auth/authorize`; `AuthorizationServer::authorize`
//!    validates the client and issues a single-use code valid for 5 minutes
//! 2. The user agent is redirected back to the platform with `code` and `state`
//! 3. The platform exchanges the code at `POST /auth/token` for an access token
//!    (1 hour) and a refresh token
//! 4. Fulfillment requests carry `Authorization: Bearer <access_token>`, checked by
//!    `TokenVerifier`
//! 5. The platform mints new access tokens with the `refresh_token` grant
//!
//! # Example
//!
//! ```no_run
//! use deyelink_auth::{
//!     AuthorizationServer, AuthorizeRequest, ClientRegistration, FixedIdentity,
//!     MemoryCredentialStore, TokenVerifier,
//! };
//! use std::sync::Arc;
//!
//! async fn example() {
//!     let store = Arc::new(MemoryCredentialStore::new());
//!     let server = AuthorizationServer::new(
//!         ClientRegistration::new("deye-google-home", "secret"),
//!         store.clone(),
//!         Arc::new(FixedIdentity::new("deye-user")),
//!     );
//!
//!     let redirect = server
//!         .authorize(AuthorizeRequest {
//!             client_id: Some("deye-google-home".to_string()),
//!             redirect_uri: Some("https://oauth-redirect.googleusercontent.com/r/project".to_string()),
//!             state: Some("xyz".to_string()),
//!             response_type: Some("code".to_string()),
//!         })
//!         .await
//!         .unwrap();
//!     println!("Redirect to {}", redirect.location);
//!
//!     let verifier = TokenVerifier::new(store);
//!     let _ = verifier.verify_header(Some("Bearer ...")).await;
//! }
//! ```

pub mod clock;
pub mod credential;
pub mod error;
pub mod flow;
pub mod identity;
pub mod store;
pub mod verifier;

pub use clock::{Clock, ManualClock, SystemClock};
pub use credential::{
    generate_token, hash_token, AccessToken, AuthorizationCode, RefreshToken, Subject,
    ACCESS_TOKEN_TTL_SECONDS, AUTHORIZATION_CODE_TTL_SECONDS,
};
pub use error::{AuthError, AuthResult};
pub use flow::{
    AuthorizationServer, AuthorizeRedirect, AuthorizeRequest, ClientRegistration, TokenRequest,
    TokenResponse, GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN,
};
pub use identity::{FixedIdentity, IdentityProvider};
pub use store::{CredentialStore, MemoryCredentialStore, StoreStats};
pub use verifier::{extract_bearer, TokenVerifier};
