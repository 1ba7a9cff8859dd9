// Caller identity. A bearer token is verified once per request by
// `resolve_identity`; handlers read the result through `MaybeIdentity`
// and never look at transport headers themselves.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::{TypedHeader, typed_header::TypedHeaderRejection};
use headers::{Authorization, authorization::Bearer};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tracing::debug;

use super::AppState;

pub const ADMIN_ACCESS: &str = "ADMIN";

/// Identity supplied by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub access: String,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.access == ADMIN_ACCESS
    }
}

/// Claims carried by access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: i64,
    pub user_access: String,
    pub exp: u64,
}

/// HS256 access token verifier.
#[derive(Clone)]
pub struct IdentityVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl IdentityVerifier {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Option<Identity> {
        match jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation) {
            Ok(data) => Some(Identity {
                user_id: data.claims.user_id.to_string(),
                access: data.claims.user_access,
            }),
            Err(e) => {
                debug!("Rejected access token: {}", e);
                None
            }
        }
    }
}

/// Attach an `Identity` to the request when it carries a valid bearer token.
/// Requests without one continue anonymously.
pub async fn resolve_identity(
    State(state): State<AppState>,
    authorization: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().remove::<Identity>();

    if let (Some(verifier), Ok(TypedHeader(authorization))) =
        (state.identity.as_ref(), authorization)
    {
        if let Some(identity) = verifier.verify(authorization.token()) {
            debug!("Request authenticated as user {}", identity.user_id);
            request.extensions_mut().insert(identity);
        }
    }

    next.run(request).await
}

/// Extractor for the identity resolved upstream, if any.
#[derive(Debug, Clone)]
pub struct MaybeIdentity(pub Option<Identity>);

impl<S> FromRequestParts<S> for MaybeIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeIdentity(parts.extensions.get::<Identity>().cloned()))
    }
}

#[cfg(test)]
pub(crate) fn issue_token(secret: &[u8], user_id: i64, access: &str) -> String {
    let claims = Claims {
        user_id,
        user_access: access.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as u64,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(Algorithm::HS256),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(secret),
    )
    .unwrap()
}
