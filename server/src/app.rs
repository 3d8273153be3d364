use std::sync::Arc;

use anyhow::{Result, bail};
use platform_authz::{
    Authorizer, PermissionEvaluator, PermissionPolicyProvider, StaticPolicies,
};
use platform_db::{DbPool, UnitOfWork};
use platform_permissions::PermissionService;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn};

use crate::graphql::{GraphqlData, operations};

/// Wires the permission store, policy provider and evaluator over `pool`.
pub fn services(pool: DbPool) -> Result<GraphqlData> {
    let service = PermissionService::with_span(UnitOfWork::new(pool), info_span!("permissions"));
    let provider = PermissionPolicyProvider::new(StaticPolicies::with_role_defaults()?);
    let evaluator = PermissionEvaluator::with_span(Arc::new(service.clone()), info_span!("authz"));
    Ok(GraphqlData {
        authorizer: Authorizer::new(Arc::new(provider), evaluator),
        service,
    })
}

/// Every gated operation must resolve to a policy. Declared permissions
/// missing from the permission table are reported, and are fatal when
/// `strict` is set.
pub async fn check_permissions(data: &GraphqlData, strict: bool) -> Result<()> {
    data.authorizer.verify(operations::OPERATIONS)?;

    let declared = operations::declared_permissions();
    let missing = data
        .service
        .missing_names(&declared, &CancellationToken::new())
        .await
        .into_result()?;
    if missing.is_empty() {
        info!(
            operations = operations::OPERATIONS.len(),
            permissions = declared.len(),
            "declared permissions verified"
        );
        return Ok(());
    }
    if strict {
        bail!(
            "declared permissions missing from the permission table: {}",
            missing.join(", ")
        );
    }
    warn!(
        ?missing,
        "declared permissions missing from the permission table; only callers holding them as claims will pass"
    );
    Ok(())
}
