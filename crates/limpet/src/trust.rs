//! Trust registries for directories, network origins, and foreign types.
//!
//! A registry is an unordered, duplicate-free set assembled fresh on every
//! policy evaluation from two sources: values owned by the running process
//! (the interpreter's own install path and origin) and the interpreter's
//! mutable trust lists. Rebuilding per call keeps decisions correct when a
//! script grows the trust lists between operations; the lists are only read
//! under the host's lock for the span of the copy.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::host::Host;
use crate::policy::{PolicyError, PolicyResult};

/// A network origin: the scheme, host, and explicit port of a URL.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Origin {
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl Origin {
    /// An origin with the scheme's default port.
    pub fn new(scheme: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into().to_ascii_lowercase(),
            host: host.into().to_ascii_lowercase(),
            port: None,
        }
    }

    /// An origin with an explicit, non-default port.
    pub fn with_port(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            port: Some(port),
            ..Self::new(scheme, host)
        }
    }

    /// Parse the origin of an absolute URL. Returns `None` when the text is
    /// not an absolute URL or has no host component.
    pub fn parse(text: &str) -> Option<Self> {
        let url = Url::parse(text).ok()?;
        let host = url.host_str()?;
        Some(Self {
            scheme: url.scheme().to_ascii_lowercase(),
            host: host.to_ascii_lowercase(),
            port: url.port(),
        })
    }

    /// The URL scheme.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The host name.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The explicit port, when one was given and is not the scheme default.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Whether this origin uses a secure transport.
    ///
    /// A trusted origin can never really be anything other than HTTPS;
    /// insecure origins are excluded from the trust registry even when the
    /// interpreter's own list contains them.
    pub fn is_secure(&self) -> bool {
        self.scheme == "https"
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}://{}:{}", self.scheme, self.host, port),
            None => write!(f, "{}://{}", self.scheme, self.host),
        }
    }
}

/// Parse `text` as a remote script location.
///
/// Only schemes that actually denote a remote transfer qualify; this keeps
/// plain file paths (including Windows drive letters, which parse as
/// single-letter URL schemes) out of the origin-trust path.
pub fn remote_origin(text: &str) -> Option<Origin> {
    let origin = Origin::parse(text)?;
    match origin.scheme() {
        "http" | "https" | "ftp" => Some(origin),
        _ => None,
    }
}

/// Identity of a foreign type exposed to scripts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeIdentity(String);

impl TypeIdentity {
    /// Identity from the type's fully qualified name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The fully qualified name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeIdentity {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

bitflags! {
    /// Flags the host attaches to foreign objects it exposes to scripts.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ObjectFlags: u32 {
        /// The object is marked safe for use from restricted interpreters.
        const SAFE = 1 << 0;
    }
}

/// Build the directory-trust registry: the interpreter's own initialized
/// path plus its configured trusted paths.
pub fn trusted_directories(host: &dyn Host) -> BTreeSet<PathBuf> {
    let mut directories = BTreeSet::new();

    if let Some(path) = host.initialized_path() {
        directories.insert(path);
    }

    if let Ok(lists) = host.trust_lists().read() {
        for path in &lists.paths {
            directories.insert(path.clone());
        }
    }

    tracing::trace!(count = directories.len(), "built directory trust registry");
    directories
}

/// Build the origin-trust registry: the interpreter's own origin plus its
/// configured trusted origins, secure transports only.
pub fn trusted_origins(host: &dyn Host) -> BTreeSet<Origin> {
    let mut origins = BTreeSet::new();

    if let Some(origin) = host.origin()
        && origin.is_secure()
    {
        origins.insert(origin);
    }

    if let Ok(lists) = host.trust_lists().read() {
        for origin in &lists.origins {
            if origin.is_secure() {
                origins.insert(origin.clone());
            } else {
                tracing::debug!(%origin, "skipping insecure trusted origin");
            }
        }
    }

    tracing::trace!(count = origins.len(), "built origin trust registry");
    origins
}

/// Build the type-trust registry from the interpreter's trusted types.
pub fn trusted_types(host: &dyn Host) -> BTreeSet<TypeIdentity> {
    let mut types = BTreeSet::new();

    if let Ok(lists) = host.trust_lists().read() {
        for identity in &lists.types {
            types.insert(identity.clone());
        }
    }

    types
}

/// Check whether a safe interpreter may use the given foreign type.
///
/// `source` names where the type request came from (a script fragment, an
/// assembly) and appears in the denial message.
///
/// # Errors
///
/// [`PolicyError::PermissionDenied`] when the type is not trusted.
pub fn check_trusted_type(
    host: &dyn Host,
    source: &str,
    identity: &TypeIdentity,
) -> PolicyResult<()> {
    if trusted_types(host).contains(identity) {
        return Ok(());
    }

    Err(PolicyError::PermissionDenied {
        kind: "type",
        origin: source.to_string(),
    })
}

/// Check whether a safe interpreter may use a foreign object, based on the
/// flags the host attached when exposing it.
///
/// # Errors
///
/// [`PolicyError::PermissionDenied`] when the object is not marked safe.
pub fn check_trusted_object(source: &str, flags: ObjectFlags) -> PolicyResult<()> {
    if flags.contains(ObjectFlags::SAFE) {
        return Ok(());
    }

    Err(PolicyError::PermissionDenied {
        kind: "object",
        origin: source.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_parse() {
        let origin = Origin::parse("https://Example.COM/path/script.tcl").unwrap();
        assert_eq!(origin.scheme(), "https");
        assert_eq!(origin.host(), "example.com");
        assert_eq!(origin.port(), None);
    }

    #[test]
    fn test_origin_parse_explicit_port() {
        let origin = Origin::parse("https://example.com:8443/x").unwrap();
        assert_eq!(origin.port(), Some(8443));
        assert_ne!(origin, Origin::new("https", "example.com"));
    }

    #[test]
    fn test_origin_default_port_elided() {
        let origin = Origin::parse("https://example.com:443/x").unwrap();
        assert_eq!(origin.port(), None);
        assert_eq!(origin, Origin::new("https", "example.com"));
    }

    #[test]
    fn test_origin_security() {
        assert!(Origin::new("https", "example.com").is_secure());
        assert!(!Origin::new("http", "example.com").is_secure());
        assert!(!Origin::new("ftp", "example.com").is_secure());
    }

    #[test]
    fn test_remote_origin_rejects_paths() {
        assert!(remote_origin("/usr/lib/scripts/init.tcl").is_none());
        assert!(remote_origin("scripts/init.tcl").is_none());
        // Drive letters parse as URL schemes but are not remote.
        assert!(remote_origin("c:/scripts/init.tcl").is_none());
    }

    #[test]
    fn test_remote_origin_accepts_transfers() {
        assert!(remote_origin("https://example.com/x").is_some());
        assert!(remote_origin("http://example.com/x").is_some());
        assert!(remote_origin("ftp://example.com/x").is_some());
        assert!(remote_origin("mailto:someone@example.com").is_none());
    }

    #[test]
    fn test_origin_display() {
        assert_eq!(
            Origin::new("https", "example.com").to_string(),
            "https://example.com"
        );
        assert_eq!(
            Origin::with_port("https", "example.com", 8443).to_string(),
            "https://example.com:8443"
        );
    }

    #[test]
    fn test_object_flags() {
        assert!(check_trusted_object("lib.dll", ObjectFlags::SAFE).is_ok());
        let denied = check_trusted_object("lib.dll", ObjectFlags::empty());
        assert!(matches!(
            denied,
            Err(PolicyError::PermissionDenied { kind: "object", .. })
        ));
    }
}
