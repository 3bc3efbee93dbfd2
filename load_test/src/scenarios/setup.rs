//! Setup - ensure the organization, source types and project exist

use loadtest_client::requests::{self, SourceTypeSpec, SOURCE_TYPES};
use loadtest_core::{LoadTestResult, ResourceDto, ResourceKind};

use crate::context::RunContext;
use crate::session::SessionContext;

pub async fn run(context: &RunContext, session: &mut SessionContext) -> LoadTestResult<()> {
    session.admin_token = Some(context.broker.admin_token().await?);
    let token = session.require_admin_token()?;

    let organization = ensure_organization(context, token).await?;
    let mut source_types = Vec::with_capacity(SOURCE_TYPES.len());
    for spec in SOURCE_TYPES {
        source_types.push(ensure_source_type(context, token, spec).await?);
    }
    let project = ensure_project(context, token, &organization, &source_types).await?;

    tracing::info!(
        organization = %context.config.organization_name,
        project = %context.config.project_name,
        project_id = project.field("id").as_deref().unwrap_or("-"),
        source_types = source_types.len(),
        "project ready"
    );
    Ok(())
}

async fn ensure_organization(context: &RunContext, token: &str) -> LoadTestResult<ResourceDto> {
    let management = &context.clients.management;
    let name = context.config.organization_name.as_str();
    context
        .ensurer
        .ensure(
            ResourceKind::Organization,
            name,
            move || management.get_organization(token, name),
            move || management.create_organization(token, name, requests::organization_body(name)),
        )
        .await
}

async fn ensure_source_type(context: &RunContext, token: &str, spec: SourceTypeSpec) -> LoadTestResult<ResourceDto> {
    let management = &context.clients.management;
    context
        .ensurer
        .ensure(
            ResourceKind::SourceType,
            spec.name,
            move || management.find_source_type(token, spec.name),
            move || management.create_source_type(token, spec.name, spec.body()),
        )
        .await
}

async fn ensure_project(
    context: &RunContext,
    token: &str,
    organization: &ResourceDto,
    source_types: &[ResourceDto],
) -> LoadTestResult<ResourceDto> {
    let management = &context.clients.management;
    let name = context.config.project_name.as_str();
    let body = requests::project_body(name, organization, source_types);
    context
        .ensurer
        .ensure(
            ResourceKind::Project,
            name,
            move || management.get_project(token, name),
            move || management.create_project(token, name, body),
        )
        .await
}
