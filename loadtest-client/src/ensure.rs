//! Fetch-or-create of management portal entities.

use std::future::Future;
use std::sync::Arc;

use loadtest_core::{
    Created, ExpectedStatus, LoadTestResult, Lookup, ProtocolError, RegistryCache, ResourceDto,
    ResourceKind,
};

/// Ensures an entity exists exactly once per natural key and caches it.
///
/// The cache is consulted first, so repeated calls for the same key within
/// a run issue no requests at all.
#[derive(Debug, Clone)]
pub struct ResourceEnsurer {
    cache: Arc<RegistryCache>,
}

impl ResourceEnsurer {
    pub fn new(cache: Arc<RegistryCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<RegistryCache> {
        &self.cache
    }

    /// Returns the cached entity, or looks it up, or creates it.
    ///
    /// A create answered with 409 means another session won the race; the
    /// entity is looked up once more and a second miss is a protocol error.
    pub async fn ensure<L, LF, C, CF>(
        &self,
        kind: ResourceKind,
        key: &str,
        mut lookup: L,
        create: C,
    ) -> LoadTestResult<ResourceDto>
    where
        L: FnMut() -> LF,
        LF: Future<Output = LoadTestResult<Lookup>>,
        C: FnOnce() -> CF,
        CF: Future<Output = LoadTestResult<Created>>,
    {
        if let Some(dto) = self.cache.resource(kind, key) {
            tracing::debug!(%kind, key, "resource served from cache");
            return Ok(dto);
        }

        if let Lookup::Found(dto) = lookup().await? {
            tracing::debug!(%kind, key, "resource found");
            return Ok(self.cache.insert_resource(dto));
        }

        match create().await? {
            Created::Created(dto) => {
                tracing::info!(%kind, key, "resource created");
                Ok(self.cache.insert_resource(dto))
            }
            Created::Conflict => {
                tracing::warn!(%kind, key, "create conflicted, looking up again");
                match lookup().await? {
                    Lookup::Found(dto) => Ok(self.cache.insert_resource(dto)),
                    Lookup::NotFound => Err(ProtocolError::new(
                        format!("Create {}", kind),
                        ExpectedStatus::one(201),
                        409,
                        b"conflict on create but entity not found",
                    )
                    .into()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn acme() -> ResourceDto {
        ResourceDto::new(ResourceKind::Organization, "Acme", json!({"id": 1, "name": "Acme"}))
    }

    #[tokio::test]
    async fn second_ensure_is_served_from_cache() {
        let ensurer = ResourceEnsurer::new(Arc::new(RegistryCache::new()));
        let (lookups, creates) = (&AtomicUsize::new(0), &AtomicUsize::new(0));

        for _ in 0..2 {
            let dto = ensurer
                .ensure(
                    ResourceKind::Organization,
                    "Acme",
                    move || async move {
                        lookups.fetch_add(1, Ordering::SeqCst);
                        Ok(Lookup::NotFound)
                    },
                    move || async move {
                        creates.fetch_add(1, Ordering::SeqCst);
                        Ok(Created::Created(acme()))
                    },
                )
                .await
                .unwrap();
            assert_eq!(dto, acme());
        }

        assert_eq!(lookups.load(Ordering::SeqCst), 1);
        assert_eq!(creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn conflict_triggers_one_relookup() {
        let ensurer = ResourceEnsurer::new(Arc::new(RegistryCache::new()));
        let lookups = &AtomicUsize::new(0);

        let dto = ensurer
            .ensure(
                ResourceKind::Organization,
                "Acme",
                move || async move {
                    if lookups.fetch_add(1, Ordering::SeqCst) == 0 {
                        Ok(Lookup::NotFound)
                    } else {
                        Ok(Lookup::Found(acme()))
                    }
                },
                || async { Ok(Created::Conflict) },
            )
            .await
            .unwrap();

        assert_eq!(dto, acme());
        assert_eq!(lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn conflict_without_entity_is_a_protocol_error() {
        let ensurer = ResourceEnsurer::new(Arc::new(RegistryCache::new()));
        let err = ensurer
            .ensure(
                ResourceKind::Project,
                "radar",
                || async { Ok(Lookup::NotFound) },
                || async { Ok(Created::Conflict) },
            )
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(409));
        assert!(ensurer.cache().resource(ResourceKind::Project, "radar").is_none());
    }
}
