//! Ingestion - one batch of synthetic questionnaires per session

use loadtest_codec::ObservationKey;
use loadtest_core::{DataError, LoadTestResult, ResourceKind};

use super::discovery::sample_subject;
use super::registration::questionnaire_source_name;
use crate::context::RunContext;
use crate::session::SessionContext;

pub async fn run(context: &RunContext, session: &mut SessionContext) -> LoadTestResult<()> {
    let data = &context.config.data;
    let login = sample_subject(context, session)?;
    let external_id = session.require_external_id()?.to_string();
    let token = context.broker.access_token(&login).await?;

    let source = context
        .cache
        .require_resource(ResourceKind::Source, &questionnaire_source_name(&external_id))?;
    session.source_id = Some(
        source
            .field("sourceId")
            .ok_or_else(|| DataError::new(session.label(), "sourceId"))?,
    );
    session.topic = Some(data.topic.clone());
    session.schema_ids = Some(context.cache.schema_ids(&data.topic)?);

    let questionnaires = (0..data.messages_per_request)
        .map(|_| context.generator.generate(data.answers_per_message))
        .collect::<LoadTestResult<Vec<_>>>()?;
    let key = ObservationKey::new(&context.config.project_name, &login, session.require_source_id()?);
    let payload = context.encoder.encode(
        data.format,
        session.require_schema_ids()?,
        &context.cache,
        &key,
        &questionnaires,
    )?;

    let status = context
        .clients
        .gateway
        .send(&token, session.require_topic()?, &payload)
        .await?;
    context.metrics.records_sent(payload.records);
    tracing::debug!(login = %login, status, records = payload.records, "batch sent");
    Ok(())
}
