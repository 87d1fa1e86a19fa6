//! PackageRepository cluster resource
//!
//! A repository is a named, URL-addressed source of package indices and manifests.
//! At most one repository should carry the default annotation.

use kube::CustomResource;
use serde::{Deserialize, Serialize};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;

/// Annotation marking the default repository
pub const DEFAULT_REPOSITORY_ANNOTATION: &str = "packages.skiff.io/defaultRepository";

/// Reference to a single key inside a Secret
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeyRef {
    pub name: String,
    pub key: String,
}

/// Basic authentication: each value is given inline or via a Secret reference
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicAuthSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_secret_ref: Option<SecretKeyRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_secret_ref: Option<SecretKeyRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BearerAuthSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_secret_ref: Option<SecretKeyRef>,
}

/// Repository authentication (basic and bearer are mutually exclusive)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryAuthSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic: Option<BasicAuthSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer: Option<BearerAuthSpec>,
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "packages.skiff.io",
    version = "v1alpha1",
    kind = "PackageRepository",
    status = "PackageRepositoryStatus",
    derive = "PartialEq",
    derive = "Default",
    schema = "disabled"
)]
pub struct PackageRepositorySpec {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<RepositoryAuthSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageRepositoryStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl PackageRepository {
    /// Whether this repository is marked as the default
    pub fn is_default(&self) -> bool {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(DEFAULT_REPOSITORY_ANNOTATION))
            .is_some_and(|v| v == "true")
    }

    /// Mark or unmark this repository as the default
    pub fn set_default(&mut self, value: bool) {
        let annotations = self.metadata.annotations.get_or_insert_with(Default::default);
        if value {
            annotations.insert(DEFAULT_REPOSITORY_ANNOTATION.to_string(), "true".to_string());
        } else {
            annotations.remove(DEFAULT_REPOSITORY_ANNOTATION);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_annotation() {
        let mut repo = PackageRepository::new(
            "main",
            PackageRepositorySpec {
                url: "https://packages.example.com/".to_string(),
                auth: None,
            },
        );
        assert!(!repo.is_default());

        repo.set_default(true);
        assert!(repo.is_default());

        repo.set_default(false);
        assert!(!repo.is_default());
    }

    #[test]
    fn test_spec_deserialization() {
        let yaml = r#"
apiVersion: packages.skiff.io/v1alpha1
kind: PackageRepository
metadata:
  name: private
spec:
  url: https://private.example.com/packages
  auth:
    basic:
      username: admin
      passwordSecretRef:
        name: repo-creds
        key: password
"#;
        let repo: PackageRepository = serde_yaml::from_str(yaml).unwrap();
        let basic = repo.spec.auth.unwrap().basic.unwrap();
        assert_eq!(basic.username.as_deref(), Some("admin"));
        assert_eq!(
            basic.password_secret_ref,
            Some(SecretKeyRef {
                name: "repo-creds".to_string(),
                key: "password".to_string(),
            })
        );
    }
}
