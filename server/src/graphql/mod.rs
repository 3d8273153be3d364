pub mod operations;
mod permissions;

use async_graphql::{
    Context, EmptySubscription, ErrorExtensions, MergedObject, Object, Schema, SimpleObject,
};
use platform_api::{ApiResult, Outcome, internal_error};
use platform_authz::{Authorizer, Principal, RequirePermission};
use platform_permissions::PermissionService;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use permissions::{PermissionMutations, PermissionQueries};

pub type SchemaType = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Shared, read-only services available to every resolver.
#[derive(Clone)]
pub struct GraphqlData {
    pub service: PermissionService,
    pub authorizer: Authorizer,
}

/// Per-request caller and cancellation signal.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub principal: Principal,
    pub cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(principal: Principal, cancel: CancellationToken) -> Self {
        Self { principal, cancel }
    }
}

pub fn build_schema(data: GraphqlData) -> SchemaType {
    Schema::build(QueryRoot::default(), MutationRoot::default(), EmptySubscription)
        .data(data)
        .finish()
}

#[derive(MergedObject, Default)]
pub struct QueryRoot(MetaQuery, PermissionQueries);

#[derive(MergedObject, Default)]
pub struct MutationRoot(PermissionMutations);

#[derive(Default)]
pub struct MetaQuery;

#[Object]
impl MetaQuery {
    #[instrument(name = "graphql.health", skip_all)]
    async fn health(&self) -> ApiResult<HealthPayload> {
        Ok(HealthPayload { ok: true })
    }

    #[instrument(name = "graphql.version", skip_all)]
    async fn version(&self) -> ApiResult<String> {
        Ok(env!("CARGO_PKG_VERSION").to_string())
    }
}

#[derive(Clone, Debug, SimpleObject, Serialize)]
pub struct HealthPayload {
    pub ok: bool,
}

/// Gate for a protected resolver. Returns the shared services and the
/// request context once the caller is authorized.
pub(crate) async fn authorize<'a>(
    ctx: &Context<'a>,
    marker: &RequirePermission,
) -> async_graphql::Result<(&'a GraphqlData, &'a RequestContext)> {
    let data = ctx.data::<GraphqlData>()?;
    let request = ctx.data::<RequestContext>()?;
    let decision = data
        .authorizer
        .require(Some(&request.principal), marker, &request.cancel)
        .await
        .map_err(internal_error)?;
    decision.into_result().map_err(|err| err.extend())?;
    Ok((data, request))
}

pub(crate) fn respond<T>(outcome: Outcome<T>) -> async_graphql::Result<T> {
    outcome.into_result().map_err(|err| err.extend())
}
