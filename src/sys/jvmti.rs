// jvmti-watermark/src/sys/jvmti.rs
//
// JVMTI bindings for the functions and events the agent uses.
//
// The function table keeps its full C layout (156 slots) so that slot
// positions match jvmti.h; slots the agent never calls are raw padding.
// Slot numbers below are the 1-based positions from jvmti.h.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]

use std::fmt;
use std::os::raw::{c_char, c_uchar, c_void};

use crate::sys::jni::{jclass, jint, jlong, jobject, jthread, JNIEnv};

// --- Constants ---
pub const JVMTI_VERSION_1_1: jint = 0x30010100;

pub const JVMTI_EVENT_VM_INIT: u32 = 50;
pub const JVMTI_EVENT_CLASS_FILE_LOAD_HOOK: u32 = 54;
pub const JVMTI_EVENT_CLASS_LOAD: u32 = 55;
pub const JVMTI_EVENT_CLASS_PREPARE: u32 = 56;

pub const JVMTI_ENABLE: jint = 1;
pub const JVMTI_DISABLE: jint = 0;

// --- Error Codes ---

/// A `jvmtiError` as returned by the VM.
///
/// Kept as a transparent integer rather than a Rust enum: the VM may hand back
/// any code, and an unlisted discriminant in a `#[repr]` enum is undefined
/// behavior.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct jvmtiError(pub u32);

impl jvmtiError {
    pub const NONE: jvmtiError = jvmtiError(0);
    pub const INVALID_CLASS: jvmtiError = jvmtiError(21);
    pub const NOT_AVAILABLE: jvmtiError = jvmtiError(98);
    pub const NULL_POINTER: jvmtiError = jvmtiError(100);
    pub const INVALID_EVENT_TYPE: jvmtiError = jvmtiError(102);
    pub const ILLEGAL_ARGUMENT: jvmtiError = jvmtiError(103);
    pub const OUT_OF_MEMORY: jvmtiError = jvmtiError(110);

    /// The `JVMTI_ERROR_*` suffix for the codes the agent handles or
    /// produces itself; anything else comes from the VM's GetErrorName.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::NONE => "NONE",
            Self::INVALID_CLASS => "INVALID_CLASS",
            Self::NOT_AVAILABLE => "NOT_AVAILABLE",
            Self::NULL_POINTER => "NULL_POINTER",
            Self::INVALID_EVENT_TYPE => "INVALID_EVENT_TYPE",
            Self::ILLEGAL_ARGUMENT => "ILLEGAL_ARGUMENT",
            Self::OUT_OF_MEMORY => "OUT_OF_MEMORY",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Debug for jvmtiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "JVMTI_ERROR_{}({})", name, self.0),
            None => write!(f, "jvmtiError({})", self.0),
        }
    }
}

impl fmt::Display for jvmtiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// =========================================================================
// FUNCTION TYPEDEFS: JVMTI FUNCTIONS
// =========================================================================

pub type JvmtiSetEventNotificationModeFn = unsafe extern "system" fn(env: *mut jvmtiEnv, mode: jint, event_type: u32, event_thread: jthread) -> jvmtiError;
pub type JvmtiAllocateFn = unsafe extern "system" fn(env: *mut jvmtiEnv, size: jlong, mem_ptr: *mut *mut c_uchar) -> jvmtiError;
pub type JvmtiDeallocateFn = unsafe extern "system" fn(env: *mut jvmtiEnv, mem: *mut c_uchar) -> jvmtiError;
pub type JvmtiGetClassSignatureFn = unsafe extern "system" fn(env: *mut jvmtiEnv, klass: jclass, signature_ptr: *mut *mut c_char, generic_ptr: *mut *mut c_char) -> jvmtiError;
pub type JvmtiSetEventCallbacksFn = unsafe extern "system" fn(env: *mut jvmtiEnv, callbacks: *const jvmtiEventCallbacks, size_of_callbacks: jint) -> jvmtiError;
pub type JvmtiGetErrorNameFn = unsafe extern "system" fn(env: *mut jvmtiEnv, error: jvmtiError, name_ptr: *mut *mut c_char) -> jvmtiError;
pub type JvmtiGetEnvironmentLocalStorageFn = unsafe extern "system" fn(env: *mut jvmtiEnv, data_ptr: *mut *mut c_void) -> jvmtiError;
pub type JvmtiSetEnvironmentLocalStorageFn = unsafe extern "system" fn(env: *mut jvmtiEnv, data: *const c_void) -> jvmtiError;

// =========================================================================
// FUNCTION TYPEDEFS: EVENT CALLBACKS
// =========================================================================

pub type JvmtiVMInitFn = unsafe extern "system" fn(
    jvmti_env: *mut jvmtiEnv,
    jni_env: *mut JNIEnv,
    thread: jthread,
);

pub type JvmtiClassFileLoadHookFn = unsafe extern "system" fn(
    jvmti_env: *mut jvmtiEnv,
    jni_env: *mut JNIEnv,
    class_being_redefined: jclass,
    loader: jobject,
    name: *const c_char,
    protection_domain: jobject,
    class_data_len: jint,
    class_data: *const c_uchar,
    new_class_data_len: *mut jint,
    new_class_data: *mut *mut c_uchar,
);

pub type JvmtiClassLoadFn = unsafe extern "system" fn(
    jvmti_env: *mut jvmtiEnv,
    jni_env: *mut JNIEnv,
    thread: jthread,
    klass: jclass,
);

pub type JvmtiClassPrepareFn = unsafe extern "system" fn(
    jvmti_env: *mut jvmtiEnv,
    jni_env: *mut JNIEnv,
    thread: jthread,
    klass: jclass,
);

// =========================================================================
// FUNCTION TABLE
// =========================================================================

#[repr(C)]
pub struct jvmtiInterface_1_ {
    /*   1:  RESERVED */
    pub reserved1: *mut c_void,
    /*   2: Set Event Notification Mode */
    pub SetEventNotificationMode: Option<JvmtiSetEventNotificationModeFn>,
    /*   3 - 45 */
    _unused3: [*mut c_void; 43],
    /*   46: Allocate */
    pub Allocate: Option<JvmtiAllocateFn>,
    /*   47: Deallocate */
    pub Deallocate: Option<JvmtiDeallocateFn>,
    /*   48: Get Class Signature */
    pub GetClassSignature: Option<JvmtiGetClassSignatureFn>,
    /*   49 - 121 */
    _unused49: [*mut c_void; 73],
    /*   122: Set Event Callbacks */
    pub SetEventCallbacks: Option<JvmtiSetEventCallbacksFn>,
    /*   123 - 127 */
    _unused123: [*mut c_void; 5],
    /*   128: Get Error Name */
    pub GetErrorName: Option<JvmtiGetErrorNameFn>,
    /*   129 - 146 */
    _unused129: [*mut c_void; 18],
    /*   147: Get Environment Local Storage */
    pub GetEnvironmentLocalStorage: Option<JvmtiGetEnvironmentLocalStorageFn>,
    /*   148: Set Environment Local Storage */
    pub SetEnvironmentLocalStorage: Option<JvmtiSetEnvironmentLocalStorageFn>,
    /*   149 - 156 */
    _unused149: [*mut c_void; 8],
}

/// An all-null table, for building stand-in environments.
impl Default for jvmtiInterface_1_ {
    fn default() -> Self {
        Self {
            reserved1: std::ptr::null_mut(),
            SetEventNotificationMode: None,
            _unused3: [std::ptr::null_mut(); 43],
            Allocate: None,
            Deallocate: None,
            GetClassSignature: None,
            _unused49: [std::ptr::null_mut(); 73],
            SetEventCallbacks: None,
            _unused123: [std::ptr::null_mut(); 5],
            GetErrorName: None,
            _unused129: [std::ptr::null_mut(); 18],
            GetEnvironmentLocalStorage: None,
            SetEnvironmentLocalStorage: None,
            _unused149: [std::ptr::null_mut(); 8],
        }
    }
}

#[repr(C)]
pub struct jvmtiEnv {
    pub functions: *const jvmtiInterface_1_,
}

// =========================================================================
// EVENT CALLBACK TABLE
// =========================================================================

/// Mirrors `jvmtiEventCallbacks` up to `SampledObjectAlloc` (event 86).
/// Events the agent does not handle are left null.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct jvmtiEventCallbacks {
    /*   50 */
    pub VMInit: Option<JvmtiVMInitFn>,
    /*   51 - 53: VMDeath, ThreadStart, ThreadEnd */
    _unused51: [*mut c_void; 3],
    /*   54 */
    pub ClassFileLoadHook: Option<JvmtiClassFileLoadHookFn>,
    /*   55 */
    pub ClassLoad: Option<JvmtiClassLoadFn>,
    /*   56 */
    pub ClassPrepare: Option<JvmtiClassPrepareFn>,
    /*   57 - 86 */
    _unused57: [*mut c_void; 30],
}

impl Default for jvmtiEventCallbacks {
    fn default() -> Self {
        Self {
            VMInit: None,
            _unused51: [std::ptr::null_mut(); 3],
            ClassFileLoadHook: None,
            ClassLoad: None,
            ClassPrepare: None,
            _unused57: [std::ptr::null_mut(); 30],
        }
    }
}
