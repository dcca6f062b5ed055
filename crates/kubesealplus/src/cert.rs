//! Certificate loading
//!
//! A configured certificate is either a local file or a URL serving the
//! sealed-secrets controller's public cert. URL certificates are downloaded
//! into a temporary file so the sealer always gets a path.

use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use reqwest::Url;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::access::{self, AccessTokenSource, ACCESS_TOKEN_HEADER};
use crate::error::{Error, Result};

/// Path the sealed-secrets controller serves its certificate on
pub const DEFAULT_CERT_PATH: &str = "/v1/cert.pem";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a certificate comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertSource {
    File(PathBuf),
    Url(String),
}

impl CertSource {
    /// Interpret a stored config value
    pub fn parse(location: &str) -> Self {
        if has_http_scheme(location) {
            Self::Url(location.to_string())
        } else {
            Self::File(PathBuf::from(location))
        }
    }
}

fn has_http_scheme(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Normalise a certificate URL: force `https` and default an empty path to
/// the controller's cert endpoint. A bare host is accepted.
pub fn normalize_cert_url(value: &str) -> Result<String> {
    if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::Validation(format!(
            "certificate URL must not be empty or contain whitespace, got {:?}",
            value
        )));
    }

    let with_scheme = if has_http_scheme(value) {
        value.to_string()
    } else {
        format!("https://{}", value)
    };
    let mut url = Url::parse(&with_scheme)
        .map_err(|e| Error::Validation(format!("invalid certificate URL '{}': {}", value, e)))?;
    if url.host_str().is_none() {
        return Err(Error::Validation(format!(
            "certificate URL '{}' has no host",
            value
        )));
    }
    url.set_scheme("https").map_err(|_| {
        Error::Validation(format!("cannot use https for certificate URL '{}'", value))
    })?;
    if url.path().is_empty() || url.path() == "/" {
        url.set_path(DEFAULT_CERT_PATH);
    }
    Ok(url.to_string())
}

/// Normalise the value given to `config <env> cert <value>` before storing.
///
/// Existing files are stored as absolute paths. URLs, and bare host names
/// that are not files, are normalised with [`normalize_cert_url`].
pub fn normalize_location(value: &str) -> Result<String> {
    let value = value.trim();
    if has_http_scheme(value) {
        return normalize_cert_url(value);
    }

    let path = Path::new(value);
    if path.is_file() {
        let absolute = fs::canonicalize(path).map_err(|e| Error::io(path, e))?;
        return Ok(absolute.to_string_lossy().into_owned());
    }

    if looks_like_host(value) {
        return normalize_cert_url(value);
    }
    Err(Error::Certificate(format!(
        "certificate file '{}' does not exist",
        value
    )))
}

fn looks_like_host(value: &str) -> bool {
    let first = value.split('/').next().unwrap_or_default();
    !first.is_empty()
        && first.contains('.')
        && !value.ends_with(".pem")
        && !value.ends_with(".crt")
        && first
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == ':')
}

/// A certificate on disk, ready to hand to the sealer
pub struct CertFile {
    path: PathBuf,
    // Keeps a downloaded certificate alive until sealing is done
    _temp: Option<NamedTempFile>,
}

impl CertFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Loads certificates from files and URLs
pub struct CertProvider {
    tokens: Box<dyn AccessTokenSource>,
}

impl Default for CertProvider {
    fn default() -> Self {
        Self::new(Box::new(access::Cloudflared::default()))
    }
}

impl CertProvider {
    pub fn new(tokens: Box<dyn AccessTokenSource>) -> Self {
        Self { tokens }
    }

    /// Raw certificate bytes from `location`
    pub fn load(&self, location: &str) -> Result<Vec<u8>> {
        match CertSource::parse(location) {
            CertSource::File(path) => load_file(&path),
            CertSource::Url(url) => self.load_url(&url),
        }
    }

    /// A file path holding the certificate at `location`
    pub fn materialize(&self, location: &str) -> Result<CertFile> {
        // Read once so a missing or unreadable cert fails before prompting
        let bytes = self.load(location)?;
        match CertSource::parse(location) {
            CertSource::File(path) => Ok(CertFile { path, _temp: None }),
            CertSource::Url(_) => {
                let mut temp = tempfile::Builder::new()
                    .prefix("kubesealplus-cert-")
                    .suffix(".pem")
                    .tempfile()
                    .map_err(|e| Error::Certificate(format!("cannot create temp file: {}", e)))?;
                temp.write_all(&bytes)
                    .and_then(|_| temp.flush())
                    .map_err(|e| Error::Certificate(format!("cannot write temp cert: {}", e)))?;
                debug!(path = %temp.path().display(), "wrote downloaded certificate");
                Ok(CertFile {
                    path: temp.path().to_path_buf(),
                    _temp: Some(temp),
                })
            }
        }
    }

    fn load_url(&self, location: &str) -> Result<Vec<u8>> {
        self.fetch(&normalize_cert_url(location)?)
    }

    /// GET `url` as is, with an Access token when the probe asks for one
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let http_err = |e: reqwest::Error| Error::Certificate(format!("cannot fetch {}: {}", url, e));

        let probe_client = Client::builder()
            .redirect(Policy::none())
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(http_err)?;
        let token = if access::probe(&probe_client, url)? {
            info!(url = %url, "certificate URL is behind Cloudflare Access");
            Some(self.tokens.token(url)?)
        } else {
            None
        };

        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(http_err)?;
        let mut req = client.get(url);
        if let Some(token) = token {
            req = req.header(ACCESS_TOKEN_HEADER, token);
        }
        let resp = req.send().map_err(http_err)?;
        if !resp.status().is_success() {
            return Err(Error::Certificate(format!(
                "fetching {} returned {}",
                url,
                resp.status()
            )));
        }
        let bytes = resp.bytes().map_err(http_err)?;
        if bytes.is_empty() {
            return Err(Error::Certificate(format!("{} returned an empty body", url)));
        }
        info!(url = %url, bytes = bytes.len(), "downloaded certificate");
        Ok(bytes.to_vec())
    }
}

fn load_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        Error::Certificate(format!("cannot read cert file '{}': {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::tests::{response, serve, FixedToken};
    use tempfile::TempDir;

    const ACCESS_REDIRECT: (&str, &str) = (
        "Location",
        "https://myteam.cloudflareaccess.com/cdn-cgi/access/login/sealed.example.com",
    );

    fn provider() -> CertProvider {
        CertProvider::new(Box::new(FixedToken("access-token")))
    }

    #[test]
    fn test_normalize_cert_url() {
        assert_eq!(
            normalize_cert_url("example.com").unwrap(),
            "https://example.com/v1/cert.pem"
        );
        assert_eq!(
            normalize_cert_url("http://example.com").unwrap(),
            "https://example.com/v1/cert.pem"
        );
        assert_eq!(
            normalize_cert_url("https://example.com/custom/cert.pem").unwrap(),
            "https://example.com/custom/cert.pem"
        );
        assert!(normalize_cert_url("\n").is_err());
        assert!(normalize_cert_url("").is_err());
        assert!(normalize_cert_url("exa mple.com").is_err());
    }

    #[test]
    fn test_source_parse() {
        assert_eq!(
            CertSource::parse("https://example.com/v1/cert.pem"),
            CertSource::Url("https://example.com/v1/cert.pem".to_string())
        );
        assert_eq!(
            CertSource::parse("/etc/cert.pem"),
            CertSource::File(PathBuf::from("/etc/cert.pem"))
        );
    }

    #[test]
    fn test_normalize_location() {
        let tmp = TempDir::new().unwrap();
        let cert = tmp.path().join("cert.pem");
        fs::write(&cert, "PEM").unwrap();

        let stored = normalize_location(cert.to_str().unwrap()).unwrap();
        assert!(Path::new(&stored).is_absolute());
        assert!(stored.ends_with("cert.pem"));

        assert_eq!(
            normalize_location("sealed.example.com").unwrap(),
            "https://sealed.example.com/v1/cert.pem"
        );
        assert!(matches!(
            normalize_location("missing/cert.pem"),
            Err(Error::Certificate(_))
        ));
        assert!(normalize_location("nowhere.pem").is_err());
    }

    #[test]
    fn test_load_file() {
        let tmp = TempDir::new().unwrap();
        let cert = tmp.path().join("cert.pem");
        fs::write(&cert, "PEM").unwrap();

        let provider = CertProvider::default();
        assert_eq!(provider.load(cert.to_str().unwrap()).unwrap(), b"PEM");

        let file = provider.materialize(cert.to_str().unwrap()).unwrap();
        assert_eq!(file.path(), cert.as_path());
    }

    #[test]
    fn test_missing_file_is_certificate_error() {
        let provider = CertProvider::default();
        assert!(matches!(
            provider.materialize("/nonexistent/kubesealplus/cert.pem"),
            Err(Error::Certificate(_))
        ));
    }

    #[test]
    fn test_fetch_plain_url() {
        let (url, seen) = serve(vec![
            response("200 OK", &[], "PEM"),
            response("200 OK", &[], "PEM"),
        ]);
        let cert = provider().fetch(&format!("{}/v1/cert.pem", url)).unwrap();
        assert_eq!(cert, b"PEM");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(!seen[1].to_ascii_lowercase().contains(ACCESS_TOKEN_HEADER));
    }

    #[test]
    fn test_fetch_behind_access_sends_token() {
        let (url, seen) = serve(vec![
            response("302 Found", &[ACCESS_REDIRECT], ""),
            response("200 OK", &[], "PEM"),
        ]);
        let cert = provider().fetch(&format!("{}/v1/cert.pem", url)).unwrap();
        assert_eq!(cert, b"PEM");

        let seen = seen.lock().unwrap();
        assert!(!seen[0].to_ascii_lowercase().contains(ACCESS_TOKEN_HEADER));
        assert!(seen[1]
            .to_ascii_lowercase()
            .contains("cf-access-token: access-token"));
    }

    #[test]
    fn test_fetch_rejects_empty_body() {
        let (url, _seen) = serve(vec![
            response("200 OK", &[], ""),
            response("200 OK", &[], ""),
        ]);
        assert!(matches!(
            provider().fetch(&url),
            Err(Error::Certificate(_))
        ));
    }

    #[test]
    fn test_fetch_rejects_error_status() {
        let (url, _seen) = serve(vec![
            response("404 Not Found", &[], "missing"),
            response("404 Not Found", &[], "missing"),
        ]);
        let err = provider().fetch(&url).unwrap_err();
        assert!(matches!(err, Error::Certificate(ref m) if m.contains("404")));
    }
}
