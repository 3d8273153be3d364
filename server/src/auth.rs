use axum::http::{HeaderMap, header::AUTHORIZATION};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use platform_authz::{Claim, Principal, claim_types};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Claims carried by access tokens. Tokens are minted elsewhere; this
/// server only verifies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub exp: usize,
}

impl From<AccessClaims> for Principal {
    fn from(claims: AccessClaims) -> Self {
        let subject = Claim::new(claim_types::NAME_IDENTIFIER, claims.sub);
        let roles = claims.roles.into_iter().map(Claim::role);
        let permissions = claims.permissions.into_iter().map(Claim::permission);
        Principal::authenticated(std::iter::once(subject).chain(roles).chain(permissions))
    }
}

#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 30;
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> jsonwebtoken::errors::Result<AccessClaims> {
        jsonwebtoken::decode::<AccessClaims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
    }

    /// Principal for the request. A missing or invalid bearer token yields
    /// an anonymous principal.
    pub fn principal(&self, headers: &HeaderMap) -> Principal {
        let Some(token) = bearer_token(headers) else {
            return Principal::anonymous();
        };
        match self.verify(token) {
            Ok(claims) => claims.into(),
            Err(err) => {
                debug!(error = %err, "rejected bearer token");
                Principal::anonymous()
            }
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
pub(crate) mod tests {
    use axum::http::HeaderValue;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{EncodingKey, Header};
    use uuid::Uuid;

    use super::*;

    pub(crate) const SECRET: &str = "test-secret-that-is-long-enough-0123";

    pub(crate) fn token(sub: &str, permissions: &[&str], ttl: Duration) -> String {
        let claims = AccessClaims {
            sub: sub.to_string(),
            roles: Vec::new(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            exp: (Utc::now() + ttl).timestamp() as usize,
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn valid_tokens_carry_identity_and_permissions() {
        let user = Uuid::new_v4();
        let token = token(&user.to_string(), &["Users:Read"], Duration::minutes(5));
        let principal = TokenVerifier::new(SECRET).principal(&headers(&format!("Bearer {token}")));
        assert!(principal.is_authenticated());
        assert_eq!(principal.user_id(), Ok(user));
        assert!(principal.has_claim(claim_types::PERMISSION, "Users:Read"));
    }

    #[test]
    fn bad_or_missing_tokens_are_anonymous() {
        let verifier = TokenVerifier::new(SECRET);
        assert!(!verifier.principal(&HeaderMap::new()).is_authenticated());
        assert!(!verifier.principal(&headers("Bearer nope")).is_authenticated());
        assert!(!verifier.principal(&headers("Basic abc")).is_authenticated());

        let expired = token("x", &[], Duration::minutes(-10));
        assert!(
            !verifier
                .principal(&headers(&format!("Bearer {expired}")))
                .is_authenticated()
        );

        let forged = TokenVerifier::new("another-secret-that-is-long-enough-99");
        let token = token("x", &[], Duration::minutes(5));
        assert!(
            !forged
                .principal(&headers(&format!("bearer {token}")))
                .is_authenticated()
        );
    }
}
