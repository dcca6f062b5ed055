//! Template codec
//!
//! A manifest file is a SealedSecret YAML document wrapped in a Helm guard
//! that renders it for exactly one environment:
//!
//! ```text
//! {{- if eq .Values.environment "production" }}
//! apiVersion: bitnami.com/v1alpha1
//! kind: SealedSecret
//! ...
//! {{- end }}
//! ```

use tracing::debug;

use crate::error::{Error, Result};
use crate::manifest::SealedSecret;

/// Closing guard line
pub const GUARD_CLOSE: &str = "{{- end }}";

/// Opening guard line for `environment`. The environment is substituted
/// verbatim.
pub fn guard_open(environment: &str) -> String {
    format!("{{{{- if eq .Values.environment \"{}\" }}}}", environment)
}

/// Parse a templated manifest gated on `environment`.
///
/// `source` names the file in error messages.
pub fn decode(source: &str, text: &str, environment: &str) -> Result<SealedSecret> {
    let expected_open = guard_open(environment);
    let lines: Vec<&str> = text.trim().split('\n').collect();
    if lines.len() < 3 {
        return Err(Error::Format(format!(
            "template file {} needs to contain at least 3 lines",
            source
        )));
    }

    let first = lines[0].trim();
    let last = lines[lines.len() - 1].trim();
    if first != expected_open {
        return Err(Error::Format(format!(
            "first line of template ({}) not in expected format.\nExpected:\n{}\nGot:\n{}",
            source, expected_open, first
        )));
    }
    if last != GUARD_CLOSE {
        return Err(Error::Format(format!(
            "last line of template ({}) not in expected format.\nExpected:\n{}\nGot:\n{}",
            source, GUARD_CLOSE, last
        )));
    }

    let mut body = String::new();
    for line in &lines[1..lines.len() - 1] {
        body.push_str(line);
        body.push('\n');
    }
    if body.trim().is_empty() {
        return Err(Error::Format(format!(
            "template ({}) contains no manifest between the guard lines",
            source
        )));
    }

    let mut sealed: SealedSecret = serde_yaml::from_str(&body).map_err(|e| {
        Error::Format(format!(
            "template ({}) with first and last line removed is not a valid manifest ({}):\n{}",
            source, e, body
        ))
    })?;
    sealed.environment = environment.to_string();

    debug!(
        source,
        environment,
        keys = sealed.spec.encrypted_data.len(),
        "decoded manifest template"
    );
    Ok(sealed)
}

/// Serialize `sealed` inside the guard for `environment`.
///
/// Output is fully built in memory; nothing is written anywhere.
pub fn encode(sealed: &SealedSecret, environment: &str) -> Result<String> {
    let body = serde_yaml::to_string(sealed)
        .map_err(|e| Error::Format(format!("cannot serialize manifest: {}", e)))?;

    let mut out = String::with_capacity(body.len() + 64);
    out.push_str(&guard_open(environment));
    out.push('\n');
    out.push_str(&body);
    if !body.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(GUARD_CLOSE);
    out.push('\n');
    Ok(out)
}
