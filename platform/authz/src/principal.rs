use thiserror::Error;
use uuid::Uuid;

/// Claim types understood by the evaluator.
pub mod claim_types {
    pub const PERMISSION: &str = "permission";
    pub const ROLE: &str = "role";
    /// Stable user id, as issued in the `sub` of the credential.
    pub const NAME_IDENTIFIER: &str = "sub";
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Claim {
    pub kind: String,
    pub value: String,
}

impl Claim {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }

    pub fn permission(value: impl Into<String>) -> Self {
        Self::new(claim_types::PERMISSION, value)
    }

    pub fn role(value: impl Into<String>) -> Self {
        Self::new(claim_types::ROLE, value)
    }

    pub fn subject(user_id: Uuid) -> Self {
        Self::new(claim_types::NAME_IDENTIFIER, user_id.to_string())
    }
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("identity claim missing")]
    Missing,
    #[error("identity claim is not a valid user id")]
    Malformed,
}

/// The caller of the current request as presented by the credential source.
///
/// Claim types compare case-insensitively; claim values compare exactly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Principal {
    authenticated: bool,
    claims: Vec<Claim>,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(claims: impl IntoIterator<Item = Claim>) -> Self {
        Self {
            authenticated: true,
            claims: claims.into_iter().collect(),
        }
    }

    /// Shorthand for an authenticated principal identified by `user_id`.
    pub fn user(user_id: Uuid) -> Self {
        Self::authenticated([Claim::subject(user_id)])
    }

    pub fn with_claim(mut self, claim: Claim) -> Self {
        self.claims.push(claim);
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    pub fn find_all<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.claims
            .iter()
            .filter(move |claim| claim.kind.eq_ignore_ascii_case(kind))
            .map(|claim| claim.value.as_str())
    }

    pub fn find_first(&self, kind: &str) -> Option<&str> {
        self.claims
            .iter()
            .find(|claim| claim.kind.eq_ignore_ascii_case(kind))
            .map(|claim| claim.value.as_str())
    }

    pub fn has_claim(&self, kind: &str, value: &str) -> bool {
        self.find_all(kind).any(|candidate| candidate == value)
    }

    pub fn user_id(&self) -> Result<Uuid, IdentityError> {
        let raw = self
            .find_first(claim_types::NAME_IDENTIFIER)
            .ok_or(IdentityError::Missing)?;
        Uuid::parse_str(raw.trim()).map_err(|_| IdentityError::Malformed)
    }
}
