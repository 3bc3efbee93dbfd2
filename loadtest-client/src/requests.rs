//! Request bodies for the management portal.
//!
//! Bodies are built from explicit inputs. Previously fetched entities are
//! embedded verbatim as returned by the server.

use serde_json::{json, Value};

use loadtest_core::ResourceDto;

/// A source type the run registers in the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceTypeSpec {
    /// Short label used in project source names.
    pub label: &'static str,
    pub name: &'static str,
    pub producer: &'static str,
    pub model: &'static str,
    pub catalog_version: &'static str,
    pub scope: &'static str,
    pub app_provider: Option<&'static str>,
}

const APPLICATION_PROVIDER: &str = "org.radarcns.application.ApplicationServiceProvider";

pub const ARMT: SourceTypeSpec = SourceTypeSpec {
    label: "aRMT",
    name: "RADAR_aRMT",
    producer: "RADAR",
    model: "aRMT",
    catalog_version: "1.5.0",
    scope: "ACTIVE",
    app_provider: Some(APPLICATION_PROVIDER),
};

pub const PRMT: SourceTypeSpec = SourceTypeSpec {
    label: "pRMT",
    name: "RADAR_pRMT",
    producer: "RADAR",
    model: "pRMT",
    catalog_version: "1.1.0",
    scope: "PASSIVE",
    app_provider: Some(APPLICATION_PROVIDER),
};

pub const ANDROID_PHONE: SourceTypeSpec = SourceTypeSpec {
    label: "android",
    name: "ANDROID_PHONE",
    producer: "ANDROID",
    model: "PHONE",
    catalog_version: "1.0.0",
    scope: "PASSIVE",
    app_provider: None,
};

/// Source types of the project, in registration order.
pub const SOURCE_TYPES: [SourceTypeSpec; 3] = [ARMT, PRMT, ANDROID_PHONE];

impl SourceTypeSpec {
    pub fn by_label(label: &str) -> Option<SourceTypeSpec> {
        SOURCE_TYPES.iter().copied().find(|spec| spec.label == label)
    }

    pub fn body(&self) -> Value {
        let mut body = json!({
            "producer": self.producer,
            "model": self.model,
            "catalogVersion": self.catalog_version,
            "canRegisterDynamically": "true",
            "sourceTypeScope": self.scope,
            "name": self.name,
        });
        if let (Some(provider), Some(object)) = (self.app_provider, body.as_object_mut()) {
            object.insert("appProvider".to_string(), Value::from(provider));
        }
        body
    }

    /// Name of the project source of this type owned by one subject.
    pub fn source_name(&self, external_id: &str) -> String {
        format!("{}-source-{}", self.label, external_id)
    }
}

pub fn organization_body(name: &str) -> Value {
    json!({
        "name": name,
        "description": "Test Organization",
        "location": "Test Location",
    })
}

pub fn project_body(project_name: &str, organization: &ResourceDto, source_types: &[ResourceDto]) -> Value {
    json!({
        "organization": organization.json(),
        "projectName": project_name,
        "description": "Test Project",
        "location": "Test Location",
        "sourceTypes": source_types.iter().map(ResourceDto::json).collect::<Vec<_>>(),
    })
}

pub fn source_body(project: &ResourceDto, source_type: &ResourceDto, source_name: &str) -> Value {
    json!({
        "project": project.json(),
        "sourceType": source_type.json(),
        "sourceName": source_name,
        "assigned": false,
    })
}

pub fn subject_body(project: &ResourceDto, external_id: &str, sources: &[ResourceDto]) -> Value {
    json!({
        "project": project.json(),
        "externalId": external_id,
        "status": 1,
        "group": null,
        "sources": sources.iter().map(ResourceDto::json).collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadtest_core::ResourceKind;

    #[test]
    fn source_names_use_type_label() {
        assert_eq!(ARMT.source_name("ext-7"), "aRMT-source-ext-7");
        assert_eq!(SourceTypeSpec::by_label("android"), Some(ANDROID_PHONE));
    }

    #[test]
    fn android_source_type_has_no_app_provider() {
        assert!(ANDROID_PHONE.body().get("appProvider").is_none());
        assert_eq!(ARMT.body()["appProvider"], APPLICATION_PROVIDER);
    }

    #[test]
    fn project_body_embeds_fetched_entities() {
        let org = ResourceDto::new(ResourceKind::Organization, "Acme", json!({"id": 1, "name": "Acme"}));
        let armt = ResourceDto::new(ResourceKind::SourceType, "RADAR_aRMT", json!({"id": 4, "name": "RADAR_aRMT"}));
        let body = project_body("radar", &org, &[armt]);
        assert_eq!(body["organization"]["id"], 1);
        assert_eq!(body["sourceTypes"][0]["name"], "RADAR_aRMT");
    }
}
