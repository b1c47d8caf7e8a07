//! The version counter and marker records stamped into the target class.
//!
//! The class under test carries a string constant made of the pattern
//! repeated `repeat_count` times followed by one ASCII version digit:
//!
//! ```text
//! xxxxxxxx xxxxxxxx xxxxxxxx xxxxxxxx xxxxxxxx xxxxxxxx 0
//! ^match   ^slot 1  ^slot 2   ...                       ^version counter
//! ```
//!
//! Each rewrite bumps the digit and writes `[old version][watermark][identity]`
//! at the start of slot `old version + 1`. Reading the string back after N
//! definitions shows which install produced each of them, in order.

use crate::error::{ConfigError, MarkerError};
use crate::identity::InstallationIdentity;
use crate::pattern::Pattern;

pub const DEFAULT_PATTERN: &[u8] = b"xxxxxxxx";
pub const DEFAULT_REPEAT_COUNT: usize = 6;
pub const DEFAULT_WATERMARK: &[u8] = b"JVMTI";

/// Geometry of the marker string: the repeated pattern, how many times it
/// repeats before the version digit, and the watermark literal.
#[derive(Clone, Debug)]
pub struct MarkerLayout {
    pattern: Pattern,
    repeat_count: usize,
    watermark: Vec<u8>,
}

/// Where one rewrite landed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MarkerRecord {
    pub match_offset: usize,
    pub version_offset: usize,
    pub slot: usize,
    /// Version digit before the rewrite; also the first byte of the record.
    pub previous_version: u8,
    pub identity: u8,
}

impl MarkerRecord {
    pub fn new_version(&self) -> u8 {
        self.previous_version + 1
    }
}

impl MarkerLayout {
    pub fn new(
        pattern: &[u8],
        repeat_count: usize,
        watermark: &[u8],
    ) -> Result<Self, ConfigError> {
        if pattern.is_empty() {
            return Err(ConfigError::Empty("pattern"));
        }
        if watermark.is_empty() {
            return Err(ConfigError::Empty("watermark"));
        }
        // The version digit sits at `repeat_count * pattern.len()` past the
        // match and must be addressable.
        let addressable = repeat_count
            .checked_mul(pattern.len())
            .map_or(false, |distance| distance < usize::MAX);
        if repeat_count < 2 || !addressable {
            return Err(ConfigError::InvalidRepeat(repeat_count.to_string()));
        }
        let record = watermark.len() + 2;
        if record > pattern.len() {
            return Err(ConfigError::RecordTooWide { record, pattern: pattern.len() });
        }
        Ok(Self {
            pattern: Pattern::new(pattern),
            repeat_count,
            watermark: watermark.to_vec(),
        })
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn repeat_count(&self) -> usize {
        self.repeat_count
    }

    pub fn watermark(&self) -> &[u8] {
        &self.watermark
    }

    /// Bytes in one record: version, watermark, identity.
    pub fn record_len(&self) -> usize {
        self.watermark.len() + 2
    }

    /// Offset of the version digit relative to the pattern match.
    pub fn version_distance(&self) -> usize {
        self.repeat_count * self.pattern.len()
    }

    /// How many rewrites fit before a record would reach the version digit
    /// or the digit would leave `'0'..='9'`.
    pub fn max_rewrites(&self) -> usize {
        (self.repeat_count - 1).min(9)
    }

    /// Finds the marker string in `buf` and stamps it.
    ///
    /// `Ok(None)` means the pattern is absent, which is normal for classes
    /// that match the name filter but carry no marker string.
    pub fn stamp(
        &self,
        buf: &mut [u8],
        identity: InstallationIdentity,
    ) -> Result<Option<MarkerRecord>, MarkerError> {
        match self.pattern.find_in(buf) {
            Some(offset) => self.rewrite(buf, offset, identity).map(Some),
            None => Ok(None),
        }
    }

    /// Bumps the version digit and writes the record for the previous
    /// version. Every check runs before the first write, so on error `buf`
    /// is unchanged.
    pub fn rewrite(
        &self,
        buf: &mut [u8],
        match_offset: usize,
        identity: InstallationIdentity,
    ) -> Result<MarkerRecord, MarkerError> {
        let len = buf.len();
        let version_offset = offset_in(len, match_offset, self.version_distance(), 1)?;
        let version = buf[version_offset];
        if !version.is_ascii_digit() {
            return Err(MarkerError::NotADigit { found: version });
        }

        let done = usize::from(version - b'0');
        let max = self.max_rewrites();
        if done >= max {
            return Err(MarkerError::SlotsExhausted { version, max });
        }

        let slot = offset_in(len, match_offset, (done + 1) * self.pattern.len(), self.record_len())?;
        debug_assert!(slot + self.record_len() <= version_offset);

        buf[version_offset] = version + 1;
        buf[slot] = version;
        let watermark_end = slot + 1 + self.watermark.len();
        buf[slot + 1..watermark_end].copy_from_slice(&self.watermark);
        buf[watermark_end] = identity.byte();

        Ok(MarkerRecord {
            match_offset,
            version_offset,
            slot,
            previous_version: version,
            identity: identity.byte(),
        })
    }

    /// Current version digit of the marker string that starts at
    /// `match_offset`, if it is in bounds.
    pub fn version_at(&self, buf: &[u8], match_offset: usize) -> Option<u8> {
        match_offset
            .checked_add(self.version_distance())
            .and_then(|offset| buf.get(offset))
            .copied()
    }

    /// Decodes the records written so far into the marker string at
    /// `match_offset`, in slot order.
    pub fn records(&self, buf: &[u8], match_offset: usize) -> Vec<MarkerRecord> {
        let Some(version_offset) = match_offset.checked_add(self.version_distance()) else {
            return Vec::new();
        };
        let mut records = Vec::new();
        for n in 0..self.max_rewrites() {
            let slot = match_offset + (n + 1) * self.pattern.len();
            let Some(record) = buf.get(slot..slot + self.record_len()) else {
                break;
            };
            if &record[1..record.len() - 1] != self.watermark.as_slice() {
                break;
            }
            records.push(MarkerRecord {
                match_offset,
                version_offset,
                slot,
                previous_version: record[0],
                identity: record[record.len() - 1],
            });
        }
        records
    }
}

/// Two layouts are equal when they locate and write the same marker string.
impl PartialEq for MarkerLayout {
    fn eq(&self, other: &Self) -> bool {
        self.pattern.bytes() == other.pattern.bytes()
            && self.repeat_count == other.repeat_count
            && self.watermark == other.watermark
    }
}

impl Eq for MarkerLayout {}

impl Default for MarkerLayout {
    fn default() -> Self {
        Self {
            pattern: Pattern::new(DEFAULT_PATTERN),
            repeat_count: DEFAULT_REPEAT_COUNT,
            watermark: DEFAULT_WATERMARK.to_vec(),
        }
    }
}

/// `base + distance`, provided `width` bytes starting there fit in `len`.
fn offset_in(len: usize, base: usize, distance: usize, width: usize) -> Result<usize, MarkerError> {
    let offset = base.checked_add(distance);
    match offset.and_then(|o| o.checked_add(width).map(|end| (o, end))) {
        Some((offset, end)) if end <= len => Ok(offset),
        Some((offset, end)) => Err(MarkerError::OutOfBounds { offset, end, len }),
        None => Err(MarkerError::OutOfBounds { offset: base, end: usize::MAX, len }),
    }
}
