//! Request manifests for `stratumd apply`

use anyhow::{Context, bail};
use serde::Deserialize;
use std::path::Path;
use stratum_cloud::ResourceRequest;

/// Read every request in a YAML file.
///
/// The file may hold several `---` separated documents, each either one
/// request or a list of requests.
pub fn load_requests(path: &Path) -> anyhow::Result<Vec<ResourceRequest>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_requests(&content).with_context(|| format!("invalid manifest {}", path.display()))
}

pub fn parse_requests(content: &str) -> anyhow::Result<Vec<ResourceRequest>> {
    let mut requests = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        match serde_yaml::Value::deserialize(document)? {
            serde_yaml::Value::Null => {}
            value @ serde_yaml::Value::Sequence(_) => {
                requests.extend(serde_yaml::from_value::<Vec<ResourceRequest>>(value)?);
            }
            value => requests.push(serde_yaml::from_value(value)?),
        }
    }

    for request in &requests {
        validate(request)?;
    }
    Ok(requests)
}

fn validate(request: &ResourceRequest) -> anyhow::Result<()> {
    if request.name.trim().is_empty() {
        bail!("request name must not be empty");
    }
    if request.tier.trim().is_empty() {
        bail!("{}: tier must not be empty", request.name);
    }
    match (request.kind.is_snapshot(), request.primary_ref.is_some()) {
        (true, false) => bail!("{}: {} requires primary_ref", request.name, request.kind),
        (false, true) => bail!(
            "{}: primary_ref is only valid for snapshots",
            request.name
        ),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_cloud::ResourceKind;

    #[test]
    fn test_multiple_documents_and_lists() {
        let yaml = r#"
name: orders-db
kind: postgres
tier: production
output_ref: orders-db-conn
---
- name: orders-db-nightly
  kind: postgres_snapshot
  tier: production
  primary_ref: orders-db
- name: assets
  kind: blobstorage
  tier: development
---
"#;
        let requests = parse_requests(yaml).unwrap();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].output_ref.as_deref(), Some("orders-db-conn"));
        assert_eq!(requests[1].kind, ResourceKind::PostgresSnapshot);
        assert_eq!(requests[2].kind, ResourceKind::BlobStorage);
    }

    #[test]
    fn test_snapshot_without_primary_rejected() {
        let yaml = "name: nightly\nkind: postgres_snapshot\ntier: production\n";
        let err = parse_requests(yaml).unwrap_err();
        assert!(err.to_string().contains("primary_ref"));
    }

    #[test]
    fn test_primary_on_non_snapshot_rejected() {
        let yaml = "name: assets\nkind: blobstorage\ntier: dev\nprimary_ref: orders-db\n";
        assert!(parse_requests(yaml).is_err());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let yaml = "name: queue\nkind: rabbitmq\ntier: dev\n";
        assert!(parse_requests(yaml).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("requests.yaml");
        std::fs::write(&path, "name: orders-db\nkind: postgres\ntier: dev\n").unwrap();

        let requests = load_requests(&path).unwrap();
        assert_eq!(requests[0].name, "orders-db");

        let err = load_requests(&temp_dir.path().join("missing.yaml")).unwrap_err();
        assert!(err.to_string().contains("missing.yaml"));
    }
}
