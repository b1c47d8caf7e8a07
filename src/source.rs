//! The event source: what the agent needs from the VM while handling an
//! event, and the payloads it delivers.
//!
//! Handlers are written against [`EventSource`] rather than [`Jvmti`]
//! directly so the dispatch logic runs unchanged over [`HeapSource`] in tests
//! and in the offline jar tool.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::env::{Allocation, Jvmti};
use crate::error::AgentError;
use crate::sys::jni;
use crate::sys::jvmti::jvmtiError;

pub trait EventSource {
    /// Output buffer type. Dropping it releases the memory; returning it
    /// from a ClassFileLoadHook handler hands it to the source.
    type Buffer: AsRef<[u8]> + AsMut<[u8]>;

    fn class_signature(&self, klass: jni::jclass) -> Result<String, AgentError>;

    /// A zero-filled buffer of `len` bytes.
    fn allocate(&self, len: usize) -> Result<Self::Buffer, AgentError>;
}

impl EventSource for Jvmti {
    type Buffer = Allocation;

    fn class_signature(&self, klass: jni::jclass) -> Result<String, AgentError> {
        self.get_class_signature(klass)
            .map_err(|error| AgentError::Jvmti { op: "GetClassSignature", error })
    }

    fn allocate(&self, len: usize) -> Result<Allocation, AgentError> {
        Jvmti::allocate(self, len).map_err(|error| AgentError::Allocation { len, error })
    }
}

/// ClassLoad and ClassPrepare carry the same payload; only the tag differs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClassEvent {
    Load,
    Prepare,
}

impl ClassEvent {
    /// Prefix of the status line, padded so class names line up.
    pub fn tag(self) -> &'static str {
        match self {
            ClassEvent::Load => "JVMTI - ClassLoad:    ",
            ClassEvent::Prepare => "JVMTI - ClassPrepare: ",
        }
    }
}

/// Payload of one ClassFileLoadHook callback.
pub struct ClassFileLoad<'a> {
    /// Internal name (`io/simonis/Foo`) in the VM's modified UTF-8, which
    /// is not always valid UTF-8. The VM may omit it.
    pub name: Option<&'a [u8]>,
    pub loader: jni::jobject,
    /// Set when the hook fires for RedefineClasses/RetransformClasses
    /// rather than the initial definition.
    pub being_redefined: bool,
    pub class_data: &'a [u8],
}

impl fmt::Debug for ClassFileLoad<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassFileLoad")
            .field("name", &self.name.map(String::from_utf8_lossy))
            .field("loader", &self.loader)
            .field("being_redefined", &self.being_redefined)
            .field("class_data_len", &self.class_data.len())
            .finish()
    }
}

/// An in-memory event source backed by the Rust heap.
///
/// Class handles are plain addresses mapped to signatures up front; unknown
/// handles fail lookup with `INVALID_CLASS`. Allocation can be made to fail
/// to exercise the fallback path.
#[derive(Default)]
pub struct HeapSource {
    signatures: HashMap<usize, String>,
    failing_allocations: bool,
    allocations: AtomicUsize,
    lookups: Mutex<Vec<usize>>,
}

impl HeapSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signature(mut self, klass: jni::jclass, signature: impl Into<String>) -> Self {
        self.signatures.insert(klass as usize, signature.into());
        self
    }

    pub fn failing_allocations(mut self) -> Self {
        self.failing_allocations = true;
        self
    }

    /// Successful allocations handed out so far.
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Class handles looked up so far, in order.
    pub fn lookups(&self) -> Vec<usize> {
        self.lookups.lock().clone()
    }
}

impl EventSource for HeapSource {
    type Buffer = Vec<u8>;

    fn class_signature(&self, klass: jni::jclass) -> Result<String, AgentError> {
        self.lookups.lock().push(klass as usize);
        self.signatures
            .get(&(klass as usize))
            .cloned()
            .ok_or(AgentError::Jvmti { op: "GetClassSignature", error: jvmtiError::INVALID_CLASS })
    }

    fn allocate(&self, len: usize) -> Result<Vec<u8>, AgentError> {
        if self.failing_allocations {
            return Err(AgentError::Allocation { len, error: jvmtiError::OUT_OF_MEMORY });
        }
        self.allocations.fetch_add(1, Ordering::Relaxed);
        Ok(vec![0; len])
    }
}
