//! `rotate`, `new` and `config` operations
//!
//! Every operation builds the complete manifest text in memory and only then
//! replaces the file on disk, so a failure at any step leaves the file as it
//! was.

use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::cert;
use crate::config::ConfigStore;
use crate::error::{Error, Result};
use crate::filename::ManifestName;
use crate::manifest::{validate_name, SealedSecret};
use crate::prompt::{Prompt, SecretSession};
use crate::seal::{reseal, Sealer};
use crate::template;

/// What an operation did to the manifest file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Every value was left blank; the file was not touched
    Unchanged,
    /// The file was (re)written with this many freshly sealed keys
    Written { sealed: usize },
}

/// Re-seal some or all keys of an existing manifest
pub fn rotate<R: BufRead, W: Write>(
    path: &Path,
    name: &ManifestName,
    prompt: &mut Prompt<R, W>,
    sealer: &dyn Sealer,
    cert_path: &Path,
) -> Result<Outcome> {
    let source = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let mut manifest = template::decode(&source, &text, &name.environment)?;

    let keys = manifest.keys();
    if keys.is_empty() {
        return Err(Error::Format(format!(
            "manifest {} has no encryptedData keys to rotate",
            source
        )));
    }
    debug!(file = %source, keys = keys.len(), "rotating manifest");

    let session = prompt.run(SecretSession::new(&keys))?;
    let pending = session.finalize();
    if pending.is_empty() {
        info!(file = %source, "no values entered, manifest left unchanged");
        return Ok(Outcome::Unchanged);
    }

    let sealed = reseal(sealer, &mut manifest, &pending, cert_path)?;
    if manifest.spec.encrypted_data.len() != keys.len() {
        return Err(Error::Sealing(format!(
            "manifest would hold {} keys after sealing, expected {}",
            manifest.spec.encrypted_data.len(),
            keys.len()
        )));
    }

    let text = template::encode(&manifest, &name.environment)?;
    write_atomic(path, &text, true)?;
    info!(file = %source, sealed, "rotated manifest");
    Ok(Outcome::Written { sealed })
}

/// Create a new manifest from scratch
pub fn create<R: BufRead, W: Write>(
    path: &Path,
    name: &ManifestName,
    prompt: &mut Prompt<R, W>,
    sealer: &dyn Sealer,
    cert_path: &Path,
) -> Result<Outcome> {
    validate_name(&name.name)?;
    if path.exists() {
        return Err(Error::Validation(format!(
            "{} already exists, use 'kubesealplus rotate' to change it",
            path.display()
        )));
    }

    let namespace = prompt.namespace()?;
    let entered = prompt.enter()?;
    if entered.is_empty() {
        return Err(Error::Input("no secrets entered".to_string()));
    }
    let session = prompt.confirm(entered)?;
    let pending = session.finalize();
    let blank: Vec<&str> = session
        .entries()
        .iter()
        .filter(|e| !pending.contains_key(&e.key))
        .map(|e| e.key.as_str())
        .collect();
    if !blank.is_empty() {
        return Err(Error::Input(format!(
            "no value entered for {}",
            blank.join(", ")
        )));
    }

    let mut manifest = SealedSecret::new(&name.name, &namespace, &name.environment);
    let sealed = reseal(sealer, &mut manifest, &pending, cert_path)?;

    let text = template::encode(&manifest, &name.environment)?;
    write_atomic(path, &text, false)?;
    info!(file = %path.display(), sealed, "created manifest");
    Ok(Outcome::Written { sealed })
}

/// Store `value` under `key` for `environment`
pub fn configure(store: &ConfigStore, environment: &str, key: &str, value: &str) -> Result<String> {
    validate_name(environment)
        .map_err(|e| Error::Validation(format!("invalid environment name: {}", e)))?;
    let stored = cert::normalize_location(value)?;
    store.set(environment, key, &stored)?;
    info!(environment, key, value = %stored, config = %store.path().display(), "updated config");
    Ok(stored)
}

/// Replace `path` with `text` via a temp file in the same directory.
///
/// With `overwrite` unset the rename fails if `path` appeared meanwhile.
fn write_atomic(path: &Path, text: &str, overwrite: bool) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    temp.write_all(text.as_bytes())
        .and_then(|_| temp.flush())
        .map_err(|e| Error::io(temp.path(), e))?;

    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(temp.path(), meta.permissions()).map_err(|e| Error::io(path, e))?;
    }

    if overwrite {
        temp.persist(path).map_err(|e| Error::io(path, e.error))?;
    } else {
        temp.persist_noclobber(path)
            .map_err(|e| Error::io(path, e.error))?;
    }
    debug!(file = %path.display(), bytes = text.len(), "wrote manifest");
    Ok(())
}
