// ABOUTME: Rootfs URI and container image reference parsing.
// ABOUTME: Recognizes the managed docker: scheme and parses registry/name:tag@digest.

use std::fmt;
use thiserror::Error;

const MANAGED_SCHEME: &str = "docker:";
const DEFAULT_REGISTRY: &str = "docker.io";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseImageRefError {
    #[error("image reference cannot be empty")]
    Empty,

    #[error("invalid character in image reference: {0}")]
    InvalidChar(char),

    #[error("invalid image reference format: {0}")]
    InvalidFormat(String),
}

/// How a container's root filesystem is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootfsUri {
    /// `docker:///org/name#tag` style URIs: the image is pulled and sized
    /// through the runtime engine before the pod is submitted.
    Managed(ImageRef),
    /// Anything else is handed to the cluster verbatim as the pod image.
    Preloaded(String),
}

impl RootfsUri {
    pub fn parse(uri: &str) -> Result<Self, ParseImageRefError> {
        match uri.strip_prefix(MANAGED_SCHEME) {
            Some(rest) => {
                let reference = rest.replace('#', ":");
                ImageRef::parse(reference.trim_start_matches('/')).map(RootfsUri::Managed)
            }
            None => Ok(RootfsUri::Preloaded(uri.to_string())),
        }
    }

    pub fn is_managed(&self) -> bool {
        matches!(self, RootfsUri::Managed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    registry: Option<String>,
    name: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageRef {
    pub fn parse(input: &str) -> Result<Self, ParseImageRefError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseImageRefError::Empty);
        }

        if let Some(c) = input
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || "/:.-_@".contains(*c)))
        {
            return Err(ParseImageRefError::InvalidChar(c));
        }

        let (reference, digest) = match input.split_once('@') {
            Some((before, after)) => (before, Some(after.to_string())),
            None => (input, None),
        };

        // A colon followed by a slash belongs to a registry port, not a tag.
        let (path, tag) = match reference.rsplit_once(':') {
            Some((before, after)) if !after.contains('/') => (before, Some(after.to_string())),
            _ => (reference, None),
        };

        let (registry, name) = match path.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (Some(first.to_string()), rest.to_string())
            }
            _ => (None, path.to_string()),
        };

        if name.is_empty() || name.starts_with('/') || name.ends_with('/') {
            return Err(ParseImageRefError::InvalidFormat(input.to_string()));
        }

        let tag = match (&tag, &digest) {
            (None, None) => Some("latest".to_string()),
            _ => tag,
        };

        Ok(Self {
            registry,
            name,
            tag,
            digest,
        })
    }

    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Fully qualified form, the way the node's image store names images
    /// (`docker.io/library/busybox:latest`).
    pub fn qualified(&self) -> String {
        let registry = self.registry.as_deref().unwrap_or(DEFAULT_REGISTRY);
        let name = if registry == DEFAULT_REGISTRY && !self.name.contains('/') {
            format!("library/{}", self.name)
        } else {
            self.name.clone()
        };
        let mut out = format!("{}/{}", registry, name);
        if let Some(tag) = &self.tag {
            out.push(':');
            out.push_str(tag);
        }
        if let Some(digest) = &self.digest {
            out.push('@');
            out.push_str(digest);
        }
        out
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{}/", registry)?;
        }
        f.write_str(&self.name)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}
