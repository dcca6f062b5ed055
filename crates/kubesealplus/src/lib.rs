//! kubesealplus - rotate SealedSecret manifests inside Helm templates
//!
//! Each manifest lives in `secret-<name>.<environment>.yaml`, wrapped in a
//! guard that renders it only for that environment. Rotating reads the
//! sealed keys, asks for new values, seals them with `kubeseal` against the
//! environment's certificate and writes the manifest back in place.

pub mod access;
pub mod cert;
pub mod config;
pub mod error;
pub mod filename;
pub mod manifest;
pub mod ops;
pub mod prompt;
pub mod seal;
pub mod template;

pub use config::{ConfigDoc, ConfigStore};
pub use error::{Error, Result};
pub use filename::ManifestName;
pub use manifest::{Secret, SealedSecret};
pub use ops::Outcome;
pub use prompt::{Prompt, SecretEntry, SecretSession, SecretValue};
pub use seal::{Kubeseal, Sealer};
