//! Manifest filename convention: `secret-<name>.<environment>.yaml`

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use crate::error::{Error, Result};

const PREFIX: &str = "secret-";
const EXTENSION: &str = ".yaml";

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^secret-([a-z0-9-]+)\.([a-z0-9-]+)\.yaml$").expect("static regex is valid")
    })
}

/// The `(name, environment)` pair a manifest filename encodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestName {
    pub name: String,
    pub environment: String,
}

impl ManifestName {
    /// Parse a manifest path. Only the final path component is inspected.
    pub fn parse(path: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::Filename {
            filename: path.to_string(),
            reason: reason.to_string(),
        };

        let base = Path::new(path)
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| invalid("path has no file name"))?;

        if !base.starts_with(PREFIX) {
            return Err(invalid("file name must start with 'secret-'"));
        }
        if !base.ends_with(EXTENSION) {
            return Err(invalid("file name must end with '.yaml'"));
        }

        let caps = pattern().captures(base).ok_or_else(|| {
            invalid("expected exactly 'secret-<name>.<environment>.yaml' using [a-z0-9-]")
        })?;

        Ok(Self {
            name: caps[1].to_string(),
            environment: caps[2].to_string(),
        })
    }
}
