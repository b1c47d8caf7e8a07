//! Installation identity: the single character that tells installs apart.

use std::fmt;

use crate::error::ConfigError;

/// Identity written into every marker record produced by one agent install.
///
/// Not unique across installs; it only has to distinguish the installs a test
/// configures (`-agentpath:lib=a -agentpath:lib=b`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstallationIdentity(u8);

impl InstallationIdentity {
    pub const DEFAULT: InstallationIdentity = InstallationIdentity(b'a');

    /// Any byte is accepted; it is copied into the record as-is.
    pub const fn new(byte: u8) -> Self {
        Self(byte)
    }

    /// The `id=` option only takes printable ASCII, so a configured
    /// identity always reads back as one visible character.
    pub fn printable(byte: u8) -> Result<Self, ConfigError> {
        if byte.is_ascii_graphic() {
            Ok(Self(byte))
        } else {
            Err(ConfigError::InvalidIdentity(
                String::from_utf8_lossy(&[byte]).into_owned(),
            ))
        }
    }

    /// Takes the first byte of the option string; absent or empty options
    /// give [`InstallationIdentity::DEFAULT`]. A multi-byte UTF-8 character
    /// contributes its lead byte only.
    pub fn from_options(options: Option<&str>) -> Self {
        match options.and_then(|o| o.as_bytes().first()) {
            Some(&byte) => Self(byte),
            None => Self::DEFAULT,
        }
    }

    pub fn byte(self) -> u8 {
        self.0
    }
}

impl Default for InstallationIdentity {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Bytes above 0x7f print as their Latin-1 character.
impl fmt::Display for InstallationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0 as char)
    }
}
