//! Registration - one participant per session
//!
//! Ensures the participant's project sources and subject, then pairs the app
//! client with the subject and caches the resulting token pair.

use loadtest_client::requests::{self, SourceTypeSpec, ARMT, SOURCE_TYPES};
use loadtest_core::{DataError, LoadTestResult, ResourceDto, ResourceKind};

use crate::context::RunContext;
use crate::session::SessionContext;

pub async fn run(context: &RunContext, session: &mut SessionContext) -> LoadTestResult<()> {
    let subject = context.subjects.next()?;
    session.external_id = Some(subject.external_id.clone());
    session.admin_token = Some(context.broker.admin_token().await?);

    let external_id = subject.external_id.as_str();
    let admin = session.require_admin_token()?.to_string();
    let project = context
        .cache
        .require_resource(ResourceKind::Project, &context.config.project_name)?;

    let mut sources = Vec::with_capacity(SOURCE_TYPES.len());
    for spec in SOURCE_TYPES {
        sources.push(ensure_source(context, &admin, &project, spec, external_id).await?);
    }
    let subject = ensure_subject(context, &admin, &project, external_id, &sources).await?;
    let login = subject
        .identifier()
        .ok_or_else(|| DataError::new(session.label(), "subject login"))?;
    session.login = Some(login.clone());
    let questionnaire_source = questionnaire_source_name(external_id);
    session.source_id = sources
        .iter()
        .find(|source| source.natural_key == questionnaire_source)
        .and_then(|source| source.field("sourceId"));

    let tokens = context.broker.register_subject_tokens(&admin, &login).await?;
    session.tokens = Some(tokens);
    context.cache.register_subject(external_id, &login);

    tracing::debug!(external_id, login = %login, source = ?session.source_id, "participant registered");
    Ok(())
}

async fn ensure_source(
    context: &RunContext,
    token: &str,
    project: &ResourceDto,
    spec: SourceTypeSpec,
    external_id: &str,
) -> LoadTestResult<ResourceDto> {
    let management = &context.clients.management;
    let source_type = context.cache.require_resource(ResourceKind::SourceType, spec.name)?;
    let source_name = spec.source_name(external_id);
    let name = source_name.as_str();
    let body = requests::source_body(project, &source_type, name);
    context
        .ensurer
        .ensure(
            ResourceKind::Source,
            name,
            move || management.find_source(token, name),
            move || management.create_source(token, name, body),
        )
        .await
}

async fn ensure_subject(
    context: &RunContext,
    token: &str,
    project: &ResourceDto,
    external_id: &str,
    sources: &[ResourceDto],
) -> LoadTestResult<ResourceDto> {
    let management = &context.clients.management;
    let body = requests::subject_body(project, external_id, sources);
    context
        .ensurer
        .ensure(
            ResourceKind::Subject,
            external_id,
            move || management.find_subject(token, external_id),
            move || management.create_subject(token, external_id, body),
        )
        .await
}

/// Name of the source a participant's questionnaires are attributed to.
pub fn questionnaire_source_name(external_id: &str) -> String {
    ARMT.source_name(external_id)
}
