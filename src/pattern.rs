//! Byte-level substring search over raw class data.
//!
//! Class files contain embedded zero bytes, so every search here is bounded by
//! the slice length and never by a terminator.

use memchr::memmem;

/// Returns the offset of the first occurrence of `needle` in `haystack`.
///
/// An empty needle never matches.
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    memmem::find(haystack, needle)
}

/// A needle with a prebuilt searcher, reused across every class the agent
/// sees.
#[derive(Clone, Debug)]
pub struct Pattern {
    finder: memmem::Finder<'static>,
}

impl Pattern {
    pub fn new(needle: &[u8]) -> Self {
        Self {
            finder: memmem::Finder::new(needle).into_owned(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        self.finder.needle()
    }

    pub fn len(&self) -> usize {
        self.finder.needle().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find_in(&self, haystack: &[u8]) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        self.finder.find(haystack)
    }
}
