// ABOUTME: Sandbox handle validation.
// ABOUTME: Handles double as pod names, so they follow RFC 1123 subdomain rules.

use std::fmt;
use thiserror::Error;

const MAX_LEN: usize = 253;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandleError {
    #[error("handle cannot be empty")]
    Empty,

    #[error("handle exceeds maximum length of {MAX_LEN} characters")]
    TooLong,

    #[error("handle must start and end with a lowercase letter or digit")]
    BadBoundary,

    #[error("invalid character in handle: '{0}'")]
    InvalidChar(char),
}

/// Caller-chosen sandbox identifier, also used as the pod object's name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle(String);

impl Handle {
    pub fn new(value: &str) -> Result<Self, HandleError> {
        if value.is_empty() {
            return Err(HandleError::Empty);
        }

        if value.len() > MAX_LEN {
            return Err(HandleError::TooLong);
        }

        if let Some(c) = value
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '.'))
        {
            return Err(HandleError::InvalidChar(c));
        }

        let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
        let first = value.chars().next().is_some_and(alnum);
        let last = value.chars().last().is_some_and(alnum);
        if !first || !last {
            return Err(HandleError::BadBoundary);
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Handle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
