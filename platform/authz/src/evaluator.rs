use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use platform_api::{ApiError, Outcome};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, field, info_span, warn};
use uuid::Uuid;

use crate::policy::{PermissionRequirement, permission_key};
use crate::principal::{IdentityError, Principal, claim_types};

/// Authoritative source of a user's effective permission names.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    /// Names of every permission granted to `user_id` through its roles.
    /// Failures are reported in the outcome, never by panicking.
    async fn permissions_for_user(
        &self,
        user_id: Uuid,
        cancel: &CancellationToken,
    ) -> Outcome<Vec<String>>;
}

/// Which tier granted access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Grant {
    Claim,
    Store,
    Role,
    Authenticated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenyReason {
    Unauthenticated,
    MissingIdentity,
    MalformedIdentity,
    MissingRole,
    NotGranted,
    StoreFailure,
    Cancelled,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Unauthenticated => "unauthenticated",
            DenyReason::MissingIdentity => "missing_identity",
            DenyReason::MalformedIdentity => "malformed_identity",
            DenyReason::MissingRole => "missing_role",
            DenyReason::NotGranted => "not_granted",
            DenyReason::StoreFailure => "store_failure",
            DenyReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<IdentityError> for DenyReason {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Missing => DenyReason::MissingIdentity,
            IdentityError::Malformed => DenyReason::MalformedIdentity,
        }
    }
}

/// Result of evaluating a requirement. Denials carry their reason for logs
/// only; external callers see [`Decision::to_error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Succeed(Grant),
    Fail(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Succeed(_))
    }

    /// `None` when access was granted. Anonymous callers get
    /// `UNAUTHENTICATED`; every other denial is an opaque `UNAUTHORIZED`.
    pub fn to_error(&self) -> Option<ApiError> {
        match self {
            Decision::Succeed(_) => None,
            Decision::Fail(DenyReason::Unauthenticated) => Some(ApiError::unauthenticated()),
            Decision::Fail(_) => Some(ApiError::unauthorized()),
        }
    }

    pub fn into_result(self) -> Result<Grant, ApiError> {
        match self {
            Decision::Succeed(grant) => Ok(grant),
            denied => Err(denied.to_error().unwrap_or_else(ApiError::unauthorized)),
        }
    }
}

/// Two-tier permission check: the caller's `permission` claims first, the
/// permission store on a miss.
///
/// Never returns an error. Anything that goes wrong during evaluation
/// resolves to [`Decision::Fail`].
#[derive(Clone)]
pub struct PermissionEvaluator {
    source: Arc<dyn PermissionSource>,
    span: Span,
}

impl PermissionEvaluator {
    pub fn new(source: Arc<dyn PermissionSource>) -> Self {
        Self::with_span(source, Span::current())
    }

    /// Evaluation spans are parented to `span`.
    pub fn with_span(source: Arc<dyn PermissionSource>, span: Span) -> Self {
        Self { source, span }
    }

    pub async fn evaluate(
        &self,
        principal: Option<&Principal>,
        requirement: &PermissionRequirement,
        cancel: &CancellationToken,
    ) -> Decision {
        let span = info_span!(
            parent: &self.span,
            "authz.evaluate",
            permission = %requirement.permission(),
            decision = field::Empty,
        );
        async {
            let decision = self.decide(principal, requirement, cancel).await;
            match decision {
                Decision::Succeed(grant) => {
                    Span::current().record("decision", field::debug(grant));
                    debug!(?grant, "permission granted");
                }
                Decision::Fail(reason) => {
                    Span::current().record("decision", reason.as_str());
                    warn!(%reason, "permission denied");
                }
            }
            decision
        }
        .instrument(span)
        .await
    }

    async fn decide(
        &self,
        principal: Option<&Principal>,
        requirement: &PermissionRequirement,
        cancel: &CancellationToken,
    ) -> Decision {
        let Some(principal) = principal.filter(|p| p.is_authenticated()) else {
            return Decision::Fail(DenyReason::Unauthenticated);
        };

        let wanted = requirement.permission();
        if principal.has_claim(claim_types::PERMISSION, wanted) {
            return Decision::Succeed(Grant::Claim);
        }

        let user_id = match principal.user_id() {
            Ok(user_id) => user_id,
            Err(err) => return Decision::Fail(err.into()),
        };

        if cancel.is_cancelled() {
            return Decision::Fail(DenyReason::Cancelled);
        }
        let lookup = self.source.permissions_for_user(user_id, cancel);
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Decision::Fail(DenyReason::Cancelled),
            outcome = lookup => outcome,
        };

        let wanted = requirement.key();
        match outcome.into_result() {
            Ok(names) if names.iter().any(|name| permission_key(name) == wanted) => {
                Decision::Succeed(Grant::Store)
            }
            Ok(_) => Decision::Fail(DenyReason::NotGranted),
            Err(err) if err.code() == platform_api::codes::CANCELLED => {
                Decision::Fail(DenyReason::Cancelled)
            }
            Err(err) => {
                warn!(
                    %user_id,
                    code = %err.code(),
                    message = %err.message(),
                    "permission lookup failed"
                );
                Decision::Fail(DenyReason::StoreFailure)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::principal::Claim;

    /// Fails the test if evaluation reaches the store.
    pub(crate) struct UnreachableStore;

    #[async_trait]
    impl PermissionSource for UnreachableStore {
        async fn permissions_for_user(
            &self,
            user_id: Uuid,
            _cancel: &CancellationToken,
        ) -> Outcome<Vec<String>> {
            panic!("store consulted for {user_id}");
        }
    }

    /// Returns a fixed answer and records the users it was asked about.
    pub(crate) struct FixedStore {
        pub(crate) answer: Outcome<Vec<String>>,
        pub(crate) calls: Mutex<Vec<Uuid>>,
    }

    impl FixedStore {
        pub(crate) fn granting(names: &[&str]) -> Arc<Self> {
            Self::answering(Outcome::success(
                names.iter().map(|name| name.to_string()).collect(),
            ))
        }

        pub(crate) fn answering(answer: Outcome<Vec<String>>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                calls: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn calls(&self) -> Vec<Uuid> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PermissionSource for FixedStore {
        async fn permissions_for_user(
            &self,
            user_id: Uuid,
            _cancel: &CancellationToken,
        ) -> Outcome<Vec<String>> {
            self.calls.lock().unwrap().push(user_id);
            match self.answer.as_result() {
                Ok(names) => Outcome::success(names.clone()),
                Err(err) => Outcome::failure(err.clone()),
            }
        }
    }

    /// Never answers; only cancellation ends the lookup.
    struct StalledStore;

    #[async_trait]
    impl PermissionSource for StalledStore {
        async fn permissions_for_user(
            &self,
            _user_id: Uuid,
            _cancel: &CancellationToken,
        ) -> Outcome<Vec<String>> {
            std::future::pending().await
        }
    }

    fn requirement(name: &str) -> PermissionRequirement {
        PermissionRequirement::new(name).unwrap()
    }

    #[tokio::test]
    async fn claim_tier_grants_without_touching_the_store() {
        let evaluator = PermissionEvaluator::new(Arc::new(UnreachableStore));
        let principal = Principal::user(Uuid::new_v4()).with_claim(Claim::permission("Users:Read"));
        let decision = evaluator
            .evaluate(
                Some(&principal),
                &requirement("Users:Read"),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(decision, Decision::Succeed(Grant::Claim));
    }

    #[tokio::test]
    async fn claim_comparison_is_exact() {
        let user = Uuid::new_v4();
        let store = FixedStore::granting(&[]);
        let evaluator = PermissionEvaluator::new(store.clone());
        let principal = Principal::user(user).with_claim(Claim::permission("users:read"));
        let decision = evaluator
            .evaluate(
                Some(&principal),
                &requirement("Users:Read"),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(decision, Decision::Fail(DenyReason::NotGranted));
        assert_eq!(store.calls(), vec![user]);
    }

    #[tokio::test]
    async fn store_tier_grants_on_claim_miss() {
        let user = Uuid::new_v4();
        let store = FixedStore::granting(&["Users:Read", "users:delete"]);
        let evaluator = PermissionEvaluator::new(store.clone());
        let decision = evaluator
            .evaluate(
                Some(&Principal::user(user)),
                &requirement("Users:Delete"),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(decision, Decision::Succeed(Grant::Store));
        assert_eq!(store.calls(), vec![user]);
    }

    #[tokio::test]
    async fn anonymous_callers_fail_before_any_lookup() {
        let evaluator = PermissionEvaluator::new(Arc::new(UnreachableStore));
        let cancel = CancellationToken::new();
        let anonymous = Principal::anonymous().with_claim(Claim::permission("Users:Read"));

        for principal in [None, Some(&anonymous)] {
            let decision = evaluator
                .evaluate(principal, &requirement("Users:Read"), &cancel)
                .await;
            assert_eq!(decision, Decision::Fail(DenyReason::Unauthenticated));
            assert_eq!(
                decision.to_error().unwrap().code(),
                platform_api::codes::UNAUTHENTICATED
            );
        }
    }

    #[tokio::test]
    async fn missing_or_malformed_identity_fails_without_lookup() {
        let evaluator = PermissionEvaluator::new(Arc::new(UnreachableStore));
        let cancel = CancellationToken::new();

        let decision = evaluator
            .evaluate(
                Some(&Principal::authenticated([Claim::role("Admin")])),
                &requirement("Users:Read"),
                &cancel,
            )
            .await;
        assert_eq!(decision, Decision::Fail(DenyReason::MissingIdentity));

        let decision = evaluator
            .evaluate(
                Some(&Principal::authenticated([Claim::new("sub", "abc")])),
                &requirement("Users:Read"),
                &cancel,
            )
            .await;
        assert_eq!(decision, Decision::Fail(DenyReason::MalformedIdentity));
        assert_eq!(
            decision.to_error().unwrap().code(),
            platform_api::codes::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn store_failure_fails_closed() {
        let fault = std::io::Error::other("connection reset");
        let store = FixedStore::answering(Outcome::failure(ApiError::from_error(&fault)));
        let evaluator = PermissionEvaluator::new(store);
        let decision = evaluator
            .evaluate(
                Some(&Principal::user(Uuid::new_v4())),
                &requirement("Users:Read"),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(decision, Decision::Fail(DenyReason::StoreFailure));
        assert!(decision.into_result().is_err());
    }

    #[tokio::test]
    async fn cancellation_resolves_to_fail() {
        let evaluator = PermissionEvaluator::new(Arc::new(StalledStore));
        let cancel = CancellationToken::new();
        let principal = Principal::user(Uuid::new_v4());
        let trigger = cancel.clone();
        tokio::spawn(async move { trigger.cancel() });

        let decision = evaluator
            .evaluate(Some(&principal), &requirement("Users:Read"), &cancel)
            .await;
        assert_eq!(decision, Decision::Fail(DenyReason::Cancelled));
    }

    #[tokio::test]
    async fn already_cancelled_requests_still_honour_a_matching_claim() {
        let evaluator = PermissionEvaluator::new(Arc::new(UnreachableStore));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let principal = Principal::user(Uuid::new_v4()).with_claim(Claim::permission("Users:Read"));
        let decision = evaluator
            .evaluate(Some(&principal), &requirement("Users:Read"), &cancel)
            .await;
        assert_eq!(decision, Decision::Succeed(Grant::Claim));

        let decision = evaluator
            .evaluate(Some(&principal), &requirement("Users:Delete"), &cancel)
            .await;
        assert_eq!(decision, Decision::Fail(DenyReason::Cancelled));
    }

    #[tokio::test]
    async fn store_names_match_after_trimming_and_case_folding() {
        let store = FixedStore::granting(&[" Users:Read ", "RELATÓRIOS:VER"]);
        let evaluator = PermissionEvaluator::new(store);
        let principal = Principal::user(Uuid::new_v4());
        let cancel = CancellationToken::new();
        for wanted in ["users:read", " Users:Read", "Relatórios:Ver"] {
            let decision = evaluator
                .evaluate(Some(&principal), &requirement(wanted), &cancel)
                .await;
            assert_eq!(decision, Decision::Succeed(Grant::Store), "{wanted}");
        }
    }
}
