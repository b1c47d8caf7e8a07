//! Decides which classes the agent instruments.

/// Internal-name prefix of the class under test.
pub const DEFAULT_TARGET: &str = "io/simonis/InstrumentationTest";

/// Prefix match against slash-separated internal class names.
///
/// ClassFileLoadHook hands over internal names (`io/simonis/Foo`) which are
/// matched as-is. ClassLoad/ClassPrepare only give a class handle, whose
/// signature (`Lio/simonis/Foo;`) is matched through [`ClassFilter::signature_target`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassFilter {
    prefix: String,
}

impl ClassFilter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Byte-wise prefix match, so names that are not valid UTF-8 (the VM
    /// hands over modified UTF-8) still match an ASCII prefix.
    pub fn is_target(&self, name: impl AsRef<[u8]>) -> bool {
        name.as_ref().starts_with(self.prefix.as_bytes())
    }

    /// Returns the display name for a class signature if it names a target,
    /// i.e. the signature without its leading `L` and trailing `;`.
    pub fn signature_target<'a>(&self, signature: &'a str) -> Option<&'a str> {
        let name = signature.strip_prefix('L')?;
        if !self.is_target(name) {
            return None;
        }
        Some(name.strip_suffix(';').unwrap_or(name))
    }
}

impl Default for ClassFilter {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET)
    }
}
