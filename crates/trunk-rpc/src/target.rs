//! Message addressing.

use std::fmt;

/// Address of an RPC message.
///
/// A target names a topic and optionally the one server on that topic that
/// must receive the message. Fanout targets deliver a cast to every
/// listener on the topic.
///
/// # Examples
///
/// ```
/// use trunk_rpc::Target;
///
/// let target = Target::new("trunk").with_server("compute-1");
/// assert_eq!(target.to_string(), "trunk.compute-1");
///
/// let fanout = Target::new("resource-push-Trunk-1.0").fanout();
/// assert!(fanout.fanout);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    /// Topic name
    pub topic: String,
    /// Listening server (host) the message is addressed to
    pub server: Option<String>,
    /// Deliver to every listener on the topic
    pub fanout: bool,
    /// Requested endpoint API version ("major.minor")
    pub version: Option<String>,
}

impl Target {
    /// Creates a target on a topic.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            server: None,
            fanout: false,
            version: None,
        }
    }

    /// Addresses the target to one server.
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    /// Sets the requested API version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Marks the target as fanout.
    pub fn fanout(mut self) -> Self {
        self.fanout = true;
        self
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.topic)?;
        if let Some(server) = &self.server {
            write!(f, ".{}", server)?;
        }
        if self.fanout {
            write!(f, " (fanout)")?;
        }
        Ok(())
    }
}

fn parse_version(version: &str) -> Option<(u32, u32)> {
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = match parts.next() {
        Some(minor) => minor.parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor))
}

/// Returns true if an endpoint implementing `implemented` can serve a
/// request for `requested`.
///
/// Major versions must match and the implemented minor version must be at
/// least the requested one. Malformed versions are never compatible.
///
/// # Examples
///
/// ```
/// use trunk_rpc::version_is_compatible;
///
/// assert!(version_is_compatible("1.1", "1.0"));
/// assert!(!version_is_compatible("1.0", "1.1"));
/// assert!(!version_is_compatible("2.0", "1.0"));
/// ```
pub fn version_is_compatible(implemented: &str, requested: &str) -> bool {
    match (parse_version(implemented), parse_version(requested)) {
        (Some((imp_major, imp_minor)), Some((req_major, req_minor))) => {
            imp_major == req_major && imp_minor >= req_minor
        }
        _ => false,
    }
}
