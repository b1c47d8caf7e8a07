//! Agent options.
//!
//! The plain form is what the test harness uses: the whole option string is an
//! identity and only its first byte counts, whatever it is.
//!
//! ```text
//! java -agentpath:libjvmti_watermark.so=b ...
//! ```
//!
//! A string with a non-empty key before its first `=` is read as
//! comma-separated `key=value` pairs instead, so a test can shrink the marker
//! layout or stamp redefinitions too:
//!
//! ```text
//! java -agentpath:libjvmti_watermark.so=id=b,class=com/example/Sample,pattern=----,repeat=4,watermark=RS ...
//! java -agentpath:libjvmti_watermark.so=id=j,watermark=JINST,redefine=transform ...
//! ```
//!
//! `id=` is stricter than the plain form and only takes one printable ASCII
//! character. A leading `=` (as in `=` or `=x`) is a plain identity.

use crate::error::ConfigError;
use crate::filter::{ClassFilter, DEFAULT_TARGET};
use crate::identity::InstallationIdentity;
use crate::marker::{MarkerLayout, DEFAULT_PATTERN, DEFAULT_REPEAT_COUNT, DEFAULT_WATERMARK};

/// What ClassFileLoadHook does with a class that is being redefined or
/// retransformed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum RedefinePolicy {
    /// Leave the VM's bytes in effect.
    #[default]
    Skip,
    /// Stamp the new bytes like an initial definition.
    Transform,
}

impl RedefinePolicy {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "skip" => Ok(RedefinePolicy::Skip),
            "transform" => Ok(RedefinePolicy::Transform),
            other => Err(ConfigError::InvalidRedefine(other.to_string())),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub identity: InstallationIdentity,
    pub filter: ClassFilter,
    pub layout: MarkerLayout,
    pub redefine: RedefinePolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            identity: InstallationIdentity::DEFAULT,
            filter: ClassFilter::default(),
            layout: MarkerLayout::default(),
            redefine: RedefinePolicy::Skip,
        }
    }
}

impl AgentConfig {
    pub fn from_options(options: Option<&str>) -> Result<Self, ConfigError> {
        match options {
            Some(opts) if has_key(opts) => Self::from_pairs(opts),
            other => Ok(Self {
                identity: InstallationIdentity::from_options(other),
                ..Self::default()
            }),
        }
    }

    fn from_pairs(options: &str) -> Result<Self, ConfigError> {
        let mut identity = InstallationIdentity::DEFAULT;
        let mut class = DEFAULT_TARGET.to_string();
        let mut pattern = DEFAULT_PATTERN.to_vec();
        let mut repeat = DEFAULT_REPEAT_COUNT;
        let mut watermark = DEFAULT_WATERMARK.to_vec();
        let mut redefine = RedefinePolicy::default();

        for pair in options.split(',').filter(|s| !s.is_empty()) {
            let (key, value) = match pair.split_once('=') {
                Some((k, v)) if !v.is_empty() => (k.trim(), v),
                _ => return Err(ConfigError::MissingValue(pair.to_string())),
            };
            match key {
                "id" => {
                    if value.len() != 1 {
                        return Err(ConfigError::InvalidIdentity(value.to_string()));
                    }
                    identity = InstallationIdentity::printable(value.as_bytes()[0])?;
                }
                "class" => class = value.to_string(),
                "pattern" => pattern = value.as_bytes().to_vec(),
                "repeat" => {
                    repeat = value
                        .parse()
                        .map_err(|_| ConfigError::InvalidRepeat(value.to_string()))?;
                }
                "watermark" => watermark = value.as_bytes().to_vec(),
                "redefine" => redefine = RedefinePolicy::parse(value)?,
                other => return Err(ConfigError::UnknownKey(other.to_string())),
            }
        }

        Ok(Self {
            identity,
            filter: ClassFilter::new(class),
            layout: MarkerLayout::new(&pattern, repeat, &watermark)?,
            redefine,
        })
    }
}

fn has_key(options: &str) -> bool {
    options
        .split_once('=')
        .map_or(false, |(key, _)| !key.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_options_uses_fixed_layout() {
        let config = AgentConfig::from_options(None).unwrap();
        assert_eq!(config.identity.byte(), b'a');
        assert_eq!(config.filter.prefix(), "io/simonis/InstrumentationTest");
        assert_eq!(config.layout.pattern().bytes(), b"xxxxxxxx");
        assert_eq!(config.layout.repeat_count(), 6);
        assert_eq!(config.layout.watermark(), b"JVMTI");
    }

    #[test]
    fn plain_string_is_identity() {
        assert_eq!(AgentConfig::from_options(Some("b")).unwrap().identity.byte(), b'b');
        assert_eq!(AgentConfig::from_options(Some("")).unwrap().identity.byte(), b'a');
        assert_eq!(AgentConfig::from_options(Some("xyz")).unwrap().identity.byte(), b'x');
    }

    #[test]
    fn plain_identity_takes_any_first_byte() {
        let identity = |opts| AgentConfig::from_options(Some(opts)).unwrap().identity.byte();
        assert_eq!(identity(" "), b' ');
        assert_eq!(identity("\u{e9}"), 0xC3);
        assert_eq!(identity("="), b'=');
        assert_eq!(identity("=x"), b'=');
        let config = AgentConfig::from_options(Some("=")).unwrap();
        assert_eq!(config.layout.watermark(), b"JVMTI");
        assert_eq!(config.redefine, RedefinePolicy::Skip);
    }

    #[test]
    fn redefine_policy() {
        assert_eq!(AgentConfig::from_options(None).unwrap().redefine, RedefinePolicy::Skip);
        assert_eq!(
            AgentConfig::from_options(Some("redefine=transform")).unwrap().redefine,
            RedefinePolicy::Transform
        );
        let jinst = AgentConfig::from_options(Some("id=j,watermark=JINST,redefine=transform")).unwrap();
        assert_eq!(jinst.identity.byte(), b'j');
        assert_eq!(jinst.layout.watermark(), b"JINST");
        assert_eq!(jinst.redefine, RedefinePolicy::Transform);
        assert_eq!(
            AgentConfig::from_options(Some("redefine=always")).unwrap_err(),
            ConfigError::InvalidRedefine("always".into())
        );
    }

    #[test]
    fn key_value_pairs() {
        let config =
            AgentConfig::from_options(Some("id=c,class=com/example/Sample,pattern=----,repeat=4,watermark=RS"))
                .unwrap();
        assert_eq!(config.identity.byte(), b'c');
        assert!(config.filter.is_target("com/example/Sample"));
        assert_eq!(config.layout.pattern().bytes(), b"----");
        assert_eq!(config.layout.repeat_count(), 4);
        assert_eq!(config.layout.watermark(), b"RS");
    }

    #[test]
    fn rejects_bad_pairs() {
        assert_eq!(
            AgentConfig::from_options(Some("colour=red")).unwrap_err(),
            ConfigError::UnknownKey("colour".into())
        );
        assert_eq!(
            AgentConfig::from_options(Some("id=")).unwrap_err(),
            ConfigError::MissingValue("id=".into())
        );
        assert_eq!(
            AgentConfig::from_options(Some("id=ab")).unwrap_err(),
            ConfigError::InvalidIdentity("ab".into())
        );
        assert!(matches!(
            AgentConfig::from_options(Some("repeat=many")),
            Err(ConfigError::InvalidRepeat(_))
        ));
        assert!(matches!(
            AgentConfig::from_options(Some("pattern=xx")),
            Err(ConfigError::RecordTooWide { .. })
        ));
        assert_eq!(
            AgentConfig::from_options(Some("id= ")).unwrap_err(),
            ConfigError::InvalidIdentity(" ".into())
        );
    }

    #[test]
    fn repeat_that_overflows_the_marker_is_rejected() {
        let repeat = (usize::MAX / 8 + 1).to_string();
        assert_eq!(
            AgentConfig::from_options(Some(format!("repeat={}", repeat).as_str())).unwrap_err(),
            ConfigError::InvalidRepeat(repeat)
        );
    }
}
