// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structured wire-format version negotiation.

use chainrpc_core::CONTRACT_VERSION;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors parsing or negotiating a [`WireVersion`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// The version string did not match `"chainrpc/vMAJOR"`.
    #[error("invalid wire version format (expected \"chainrpc/vMAJOR\")")]
    InvalidFormat,
    /// The major component did not parse as an integer.
    #[error("invalid major version component")]
    InvalidMajor,
    /// Two versions' major components differ, so they cannot interoperate.
    #[error("incompatible wire versions: local {local}, remote {remote}")]
    Incompatible {
        /// This implementation's version.
        local: WireVersion,
        /// The peer's reported version.
        remote: WireVersion,
    },
}

/// A parsed `"chainrpc/vMAJOR"` wire-format version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WireVersion {
    /// Major version. Two peers interoperate only when this matches.
    pub major: u32,
}

impl WireVersion {
    /// Parse `"chainrpc/vMAJOR"`.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError`] if the string is malformed.
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let rest = s.strip_prefix("chainrpc/v").ok_or(VersionError::InvalidFormat)?;
        let major = rest.parse::<u32>().map_err(|_| VersionError::InvalidMajor)?;
        Ok(Self { major })
    }

    /// The version corresponding to [`CONTRACT_VERSION`].
    ///
    /// # Examples
    ///
    /// ```
    /// use chainrpc_codec::version::WireVersion;
    ///
    /// assert_eq!(WireVersion::current().major, 1);
    /// ```
    #[must_use]
    pub fn current() -> Self {
        Self::parse(CONTRACT_VERSION).expect("CONTRACT_VERSION must be a valid wire version string")
    }

    /// Two versions are compatible iff their major components match.
    #[must_use]
    pub fn is_compatible(&self, other: &WireVersion) -> bool {
        self.major == other.major
    }

    /// Check `remote` against this (local) version, surfacing a structured
    /// error on mismatch rather than a bare boolean.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::Incompatible`] if the majors differ.
    pub fn require_compatible(&self, remote: &WireVersion) -> Result<(), VersionError> {
        if self.is_compatible(remote) {
            Ok(())
        } else {
            Err(VersionError::Incompatible {
                local: *self,
                remote: *remote,
            })
        }
    }
}

impl fmt::Display for WireVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chainrpc/v{}", self.major)
    }
}
