//! Discovery - resolve the key and value schemas of every topic

use loadtest_core::{DataError, Direction, LoadTestResult, SchemaIds};

use crate::context::RunContext;
use crate::session::SessionContext;

/// Picks a registered participant and stores its identity in the session.
pub(crate) fn sample_subject(context: &RunContext, session: &mut SessionContext) -> LoadTestResult<String> {
    let (external_id, login) = context
        .cache
        .random_subject(&mut rand::thread_rng())
        .ok_or_else(|| DataError::new(session.label(), "registered subject"))?;
    session.external_id = Some(external_id);
    session.login = Some(login.clone());
    Ok(login)
}

pub async fn run(context: &RunContext, session: &mut SessionContext) -> LoadTestResult<()> {
    let login = sample_subject(context, session)?;
    let token = context.broker.access_token(&login).await?;

    for record in context.topics.records() {
        let topic = record.topic.as_str();
        session.topic = Some(topic.to_string());
        context.clients.gateway.topic_exists(&token, topic).await?;

        let ids = SchemaIds {
            key: resolve(context, &token, topic, Direction::Key).await?,
            value: resolve(context, &token, topic, Direction::Value).await?,
        };
        session.schema_ids = Some(ids);
        tracing::info!(topic, key_schema_id = ids.key, value_schema_id = ids.value, "topic schemas resolved");
    }
    Ok(())
}

async fn resolve(context: &RunContext, token: &str, topic: &str, direction: Direction) -> LoadTestResult<i32> {
    let metadata = context
        .clients
        .registry
        .resolve(token, topic, direction, context.config.data.schema_version)
        .await?;
    let id = metadata.id;
    context.cache.bind_schema(topic, direction, id)?;
    context.cache.insert_schema(metadata);
    Ok(id)
}
