//! SealedSecret and cleartext Secret documents

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::error::{Error, Result};

pub const SEALED_SECRET_API_VERSION: &str = "bitnami.com/v1alpha1";
pub const SEALED_SECRET_KIND: &str = "SealedSecret";

/// Object metadata. `None` is an explicit YAML `null`, which is kept
/// distinct from an empty string and from a missing key.
pub type Metadata = BTreeMap<String, Option<String>>;

/// A SealedSecret manifest as found between the template guard lines
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedSecret {
    /// Environment the surrounding template is gated on; never part of the
    /// YAML body.
    #[serde(skip)]
    pub environment: String,

    #[serde(rename = "apiVersion", default)]
    pub api_version: String,

    #[serde(default)]
    pub kind: String,

    #[serde(default)]
    pub metadata: Metadata,

    #[serde(default)]
    pub spec: SealedSecretSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedSecretSpec {
    /// Secret key to ciphertext
    #[serde(
        rename = "encryptedData",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub encrypted_data: BTreeMap<String, String>,

    #[serde(default)]
    pub template: SecretTemplate,
}

/// The Secret template the controller applies when unsealing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretTemplate {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub secret_type: Option<String>,

    #[serde(default)]
    pub data: Option<BTreeMap<String, Option<String>>>,

    #[serde(default)]
    pub metadata: Metadata,
}

impl SealedSecret {
    /// A fresh, empty SealedSecret scoped to `name` in `namespace`
    pub fn new(name: &str, namespace: &str, environment: &str) -> Self {
        let metadata: Metadata = [
            ("name".to_string(), Some(name.to_string())),
            ("namespace".to_string(), Some(namespace.to_string())),
        ]
        .into_iter()
        .collect();

        Self {
            environment: environment.to_string(),
            api_version: SEALED_SECRET_API_VERSION.to_string(),
            kind: SEALED_SECRET_KIND.to_string(),
            metadata: metadata.clone(),
            spec: SealedSecretSpec {
                encrypted_data: BTreeMap::new(),
                template: SecretTemplate {
                    secret_type: None,
                    data: None,
                    metadata,
                },
            },
        }
    }

    /// Keys currently sealed in this manifest, in stable order
    pub fn keys(&self) -> Vec<String> {
        self.spec.encrypted_data.keys().cloned().collect()
    }

    /// Metadata to stamp on the cleartext Secret before sealing.
    ///
    /// Falls back to the top-level metadata when the manifest carries no
    /// template metadata.
    pub fn secret_metadata(&self) -> &Metadata {
        if self.spec.template.metadata.is_empty() {
            &self.metadata
        } else {
            &self.spec.template.metadata
        }
    }
}

/// A cleartext `v1/Secret`, the input handed to the sealer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    #[serde(rename = "type")]
    pub secret_type: String,
    /// Key to base64 (standard alphabet, padded) value
    pub data: BTreeMap<String, String>,
    pub metadata: Metadata,
}

impl Secret {
    /// Build an `Opaque` Secret, base64 encoding every value
    pub fn opaque<V: AsRef<[u8]>>(metadata: &Metadata, values: &BTreeMap<String, V>) -> Self {
        let data = values
            .iter()
            .map(|(k, v)| (k.clone(), STANDARD.encode(v.as_ref())))
            .collect();

        Self {
            api_version: "v1".to_string(),
            kind: "Secret".to_string(),
            secret_type: "Opaque".to_string(),
            data,
            metadata: metadata.clone(),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| Error::Sealing(format!("cannot serialize cleartext Secret: {}", e)))
    }
}

const MAX_NAME_LEN: usize = 63;

fn dns_label() -> &'static Regex {
    static DNS_LABEL: OnceLock<Regex> = OnceLock::new();
    DNS_LABEL.get_or_init(|| {
        Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("static regex is valid")
    })
}

/// Validate a Secret name as an RFC 1123 DNS label.
/// Rules: lowercase `[a-z0-9-]`, max 63 chars, alphanumeric at both ends.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Validation("secret name must not be empty".to_string()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::Validation(format!(
            "secret name '{}' exceeds {} characters (got {})",
            name,
            MAX_NAME_LEN,
            name.len()
        )));
    }
    if !dns_label().is_match(name) {
        return Err(Error::Validation(format!(
            "secret name '{}' must be a valid DNS label:\n\
             - must only contain lowercase alphanumeric characters or -\n\
             - must start with a lowercase alphanumeric character\n\
             - must end with a lowercase alphanumeric character",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opaque_secret_yaml() {
        let metadata: Metadata = [("name".to_string(), Some("example-secret".to_string()))]
            .into_iter()
            .collect();
        let values: BTreeMap<String, String> =
            [("A".to_string(), "B".to_string())].into_iter().collect();

        let yaml = Secret::opaque(&metadata, &values).to_yaml().unwrap();
        assert_eq!(
            yaml,
            "apiVersion: v1\n\
             kind: Secret\n\
             type: Opaque\n\
             data:\n  A: Qg==\n\
             metadata:\n  name: example-secret\n"
        );
    }

    #[test]
    fn test_null_metadata_is_kept() {
        let yaml = "metadata:\n  creationTimestamp: null\n  name: x\n  namespace: ''\n";
        let parsed: SealedSecret = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed.metadata.get("creationTimestamp"), Some(&None));
        assert_eq!(parsed.metadata.get("namespace"), Some(&Some(String::new())));
        assert!(!parsed.metadata.contains_key("labels"));
    }

    #[test]
    fn test_new_sealed_secret() {
        let ss = SealedSecret::new("example", "default", "production");
        assert_eq!(ss.api_version, SEALED_SECRET_API_VERSION);
        assert_eq!(ss.kind, SEALED_SECRET_KIND);
        assert_eq!(ss.metadata, ss.spec.template.metadata);
        assert_eq!(ss.metadata.get("name"), Some(&Some("example".to_string())));
        assert!(ss.spec.template.data.is_none());
        assert!(ss.keys().is_empty());
    }

    #[test]
    fn test_secret_metadata_fallback() {
        let mut ss = SealedSecret::new("example", "default", "production");
        ss.spec.template.metadata.clear();
        assert_eq!(ss.secret_metadata(), &ss.metadata);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("").is_err());
        assert!(validate_name(&"a".repeat(64)).is_err());
        assert!(validate_name(&"a".repeat(63)).is_ok());
        assert!(validate_name("-a").is_err());
        assert!(validate_name("a-").is_err());
        assert!(validate_name("a-a").is_ok());
        assert!(validate_name("A").is_err());
        assert!(validate_name("9a").is_ok());
        assert!(validate_name("a9").is_ok());
        assert!(validate_name("a9a").is_ok());
        assert!(validate_name("a_b").is_err());
        assert!(validate_name("a.b").is_err());
        assert!(validate_name("-").is_err());
        assert!(validate_name("a").is_ok());
    }
}
