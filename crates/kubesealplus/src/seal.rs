//! Sealing orchestration
//!
//! Pending values become a cleartext `v1/Secret`, the sealer turns that into
//! ciphertexts, and the ciphertexts are merged into the manifest only when
//! every pending key came back sealed.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info};

use kubesealplus_core::{run_with_timeout, ProcessError};

use crate::error::{Error, Result};
use crate::manifest::{Metadata, Secret, SealedSecret};

/// How long the sealer gets before it is killed
pub const DEFAULT_SEAL_TIMEOUT: Duration = Duration::from_millis(500);

/// Something that can seal a cleartext Secret against a certificate
pub trait Sealer {
    /// Seal `secret_yaml`, returning key to ciphertext
    fn seal(&self, secret_yaml: &str, cert_path: &Path) -> Result<BTreeMap<String, String>>;
}

/// The `kubeseal` binary in JSON output mode
#[derive(Debug, Clone)]
pub struct Kubeseal {
    program: String,
    /// Arguments placed before `-o json --cert <path>`
    args: Vec<String>,
    timeout: Duration,
}

impl Default for Kubeseal {
    fn default() -> Self {
        Self::new()
    }
}

impl Kubeseal {
    pub fn new() -> Self {
        Self {
            program: "kubeseal".to_string(),
            args: Vec::new(),
            timeout: DEFAULT_SEAL_TIMEOUT,
        }
    }

    /// Use a different executable, with leading arguments
    pub fn with_program(mut self, program: &str, args: &[&str]) -> Self {
        self.program = program.to_string();
        self.args = args.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Deserialize)]
struct SealedOutput {
    #[serde(default)]
    spec: SealedOutputSpec,
}

#[derive(Default, Deserialize)]
struct SealedOutputSpec {
    #[serde(rename = "encryptedData", default)]
    encrypted_data: BTreeMap<String, String>,
}

impl Sealer for Kubeseal {
    fn seal(&self, secret_yaml: &str, cert_path: &Path) -> Result<BTreeMap<String, String>> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .args(["-o", "json", "--cert"])
            .arg(cert_path);

        info!(program = %self.program, cert = %cert_path.display(), "invoking sealer");
        let output = run_with_timeout(&mut cmd, secret_yaml.as_bytes(), self.timeout).map_err(
            |e| match e {
                ProcessError::Timeout { timeout, .. } => Error::Sealing(format!(
                    "{} did not finish within {:?}",
                    self.program, timeout
                )),
                other => Error::Sealing(other.to_string()),
            },
        )?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(Error::Sealing(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        if !stderr.trim().is_empty() {
            return Err(Error::Sealing(format!(
                "{} reported: {}",
                self.program,
                stderr.trim()
            )));
        }

        let parsed: SealedOutput = serde_json::from_slice(&output.stdout).map_err(|e| {
            Error::Sealing(format!("cannot parse {} output as JSON: {}", self.program, e))
        })?;
        Ok(parsed.spec.encrypted_data)
    }
}

/// Seal `pending` under `metadata`, checking that exactly the pending keys
/// came back.
pub fn seal<V: AsRef<[u8]>>(
    sealer: &dyn Sealer,
    metadata: &Metadata,
    pending: &BTreeMap<String, V>,
    cert_path: &Path,
) -> Result<BTreeMap<String, String>> {
    if pending.is_empty() {
        return Ok(BTreeMap::new());
    }

    let secret_yaml = Secret::opaque(metadata, pending).to_yaml()?;
    let sealed = sealer.seal(&secret_yaml, cert_path)?;

    if sealed.len() != pending.len() {
        return Err(Error::Sealing(format!(
            "expected {} sealed secret(s) but got {}",
            pending.len(),
            sealed.len()
        )));
    }
    if let Some(missing) = pending.keys().find(|k| !sealed.contains_key(*k)) {
        return Err(Error::Sealing(format!(
            "sealer returned no ciphertext for key '{}'",
            missing
        )));
    }

    debug!(count = sealed.len(), "sealed pending secrets");
    Ok(sealed)
}

/// Overwrite the given ciphertexts in `manifest`; every other key is left as is
pub fn merge(manifest: &mut SealedSecret, ciphertexts: BTreeMap<String, String>) {
    manifest.spec.encrypted_data.extend(ciphertexts);
}

/// Seal `pending` with the manifest's own template metadata and merge the
/// result. Returns how many keys were resealed.
pub fn reseal<V: AsRef<[u8]>>(
    sealer: &dyn Sealer,
    manifest: &mut SealedSecret,
    pending: &BTreeMap<String, V>,
    cert_path: &Path,
) -> Result<usize> {
    let ciphertexts = seal(sealer, manifest.secret_metadata(), pending, cert_path)?;
    let count = ciphertexts.len();
    merge(manifest, ciphertexts);
    Ok(count)
}
