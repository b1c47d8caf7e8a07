//! Safe wrapper around the JVMTI environment, limited to what the agent calls.
//!
//! Memory handed out by the VM (`Allocate`, `GetClassSignature`) is held in
//! guards that give it back with `Deallocate` on drop, so every exit path of
//! a handler releases it. A rewritten class buffer leaves its guard only when
//! ownership passes back to the VM through [`Allocation::into_raw`].

use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::ptr;

use crate::error::AgentError;
use crate::sys::jni;
use crate::sys::jvmti;

/// Loads a function pointer from the JVMTI table, failing the call with
/// `NOT_AVAILABLE` instead of panicking when the slot is empty.
macro_rules! jvmti_fn {
    ($env:expr, $name:ident) => {
        match unsafe { (*(*$env).functions).$name } {
            Some(f) => f,
            None => return Err(jvmti::jvmtiError::NOT_AVAILABLE),
        }
    };
}

/// A safe wrapper around the raw JVMTI Environment pointer.
pub struct Jvmti {
    env: *mut jvmti::jvmtiEnv,
}

impl Jvmti {
    /// Connects to the JVM and retrieves a fresh JVMTI environment.
    ///
    /// Every call yields a distinct environment, each with its own callbacks
    /// and local storage.
    pub fn new(vm: *mut jni::JavaVM, version: jni::jint) -> Result<Self, AgentError> {
        let mut env_ptr: *mut c_void = ptr::null_mut();

        unsafe {
            // vm: *mut JavaVM = *mut *const JNIInvokeInterface_
            let get_env_fn = (**vm).GetEnv;
            let res = get_env_fn(vm, &mut env_ptr, version);
            if res != jni::JNI_OK {
                return Err(AgentError::GetEnv(res));
            }
        }

        Ok(Jvmti {
            env: env_ptr as *mut jvmti::jvmtiEnv,
        })
    }

    /// Create a Jvmti wrapper from the environment pointer an event callback
    /// received.
    ///
    /// # Safety
    /// The caller must ensure the pointer is valid for the duration of use.
    pub unsafe fn from_raw(env: *mut jvmti::jvmtiEnv) -> Self {
        Jvmti { env }
    }

    pub fn raw(&self) -> *mut jvmti::jvmtiEnv {
        self.env
    }

    pub fn set_event_callbacks(&self, callbacks: &jvmti::jvmtiEventCallbacks) -> Result<(), jvmti::jvmtiError> {
        let set_callbacks_fn = jvmti_fn!(self.env, SetEventCallbacks);
        let size = std::mem::size_of::<jvmti::jvmtiEventCallbacks>() as jni::jint;
        let err = unsafe { set_callbacks_fn(self.env, callbacks, size) };
        if err != jvmti::jvmtiError::NONE {
            return Err(err);
        }
        Ok(())
    }

    pub fn set_event_notification_mode(&self, enable: bool, event_type: u32, thread: jni::jthread) -> Result<(), jvmti::jvmtiError> {
        let set_mode_fn = jvmti_fn!(self.env, SetEventNotificationMode);
        let mode = if enable { jvmti::JVMTI_ENABLE } else { jvmti::JVMTI_DISABLE };
        // thread can be null (all threads)
        let err = unsafe { set_mode_fn(self.env, mode, event_type, thread) };
        if err != jvmti::jvmtiError::NONE {
            return Err(err);
        }
        Ok(())
    }

    /// Allocates `len` zeroed bytes from the VM allocator.
    pub fn allocate(&self, len: usize) -> Result<Allocation, jvmti::jvmtiError> {
        let size = jni::jlong::try_from(len).map_err(|_| jvmti::jvmtiError::ILLEGAL_ARGUMENT)?;
        let allocate_fn = jvmti_fn!(self.env, Allocate);
        let mut mem_ptr: *mut u8 = ptr::null_mut();

        unsafe {
            let err = allocate_fn(self.env, size, &mut mem_ptr);
            if err != jvmti::jvmtiError::NONE {
                return Err(err);
            }
            if !mem_ptr.is_null() {
                ptr::write_bytes(mem_ptr, 0, len);
            }
        }

        Ok(Allocation { env: self.env, ptr: mem_ptr, len })
    }

    pub fn deallocate(&self, mem: *mut u8) -> Result<(), jvmti::jvmtiError> {
        if mem.is_null() {
            return Ok(());
        }
        let deallocate_fn = jvmti_fn!(self.env, Deallocate);
        let err = unsafe { deallocate_fn(self.env, mem) };
        if err != jvmti::jvmtiError::NONE {
            return Err(err);
        }
        Ok(())
    }

    /// Returns the JVM type signature of `klass`, e.g. `Ljava/lang/String;`.
    pub fn get_class_signature(&self, klass: jni::jclass) -> Result<String, jvmti::jvmtiError> {
        let get_class_sig_fn = jvmti_fn!(self.env, GetClassSignature);
        let mut sig_ptr: *mut c_char = ptr::null_mut();
        let mut gen_ptr: *mut c_char = ptr::null_mut();

        let err = unsafe { get_class_sig_fn(self.env, klass, &mut sig_ptr, &mut gen_ptr) };
        let signature = VmString { jvmti: self, ptr: sig_ptr };
        let _generic = VmString { jvmti: self, ptr: gen_ptr };
        if err != jvmti::jvmtiError::NONE {
            return Err(err);
        }
        signature.to_owned_string().ok_or(jvmti::jvmtiError::NULL_POINTER)
    }

    pub fn get_error_name(&self, error: jvmti::jvmtiError) -> Result<String, jvmti::jvmtiError> {
        let get_fn = jvmti_fn!(self.env, GetErrorName);
        let mut name_ptr: *mut c_char = ptr::null_mut();
        let err = unsafe { get_fn(self.env, error, &mut name_ptr) };
        let name = VmString { jvmti: self, ptr: name_ptr };
        if err != jvmti::jvmtiError::NONE {
            return Err(err);
        }
        name.to_owned_string().ok_or(jvmti::jvmtiError::NULL_POINTER)
    }

    pub fn get_environment_local_storage(&self) -> Result<*mut c_void, jvmti::jvmtiError> {
        let get_fn = jvmti_fn!(self.env, GetEnvironmentLocalStorage);
        let mut data: *mut c_void = ptr::null_mut();
        let err = unsafe { get_fn(self.env, &mut data) };
        if err != jvmti::jvmtiError::NONE {
            return Err(err);
        }
        Ok(data)
    }

    pub fn set_environment_local_storage(&self, data: *const c_void) -> Result<(), jvmti::jvmtiError> {
        let set_fn = jvmti_fn!(self.env, SetEnvironmentLocalStorage);
        let err = unsafe { set_fn(self.env, data) };
        if err != jvmti::jvmtiError::NONE {
            return Err(err);
        }
        Ok(())
    }
}

/// A C string owned by the VM, deallocated on drop.
struct VmString<'a> {
    jvmti: &'a Jvmti,
    ptr: *mut c_char,
}

impl VmString<'_> {
    fn to_owned_string(&self) -> Option<String> {
        if self.ptr.is_null() {
            return None;
        }
        Some(unsafe { CStr::from_ptr(self.ptr) }.to_string_lossy().into_owned())
    }
}

impl Drop for VmString<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.jvmti.deallocate(self.ptr as *mut u8) {
            log::warn!("Deallocate of VM string failed: {}", e);
        }
    }
}

/// A buffer from the VM allocator, exclusively owned until it is either
/// dropped (and deallocated) or handed to the VM with [`Allocation::into_raw`].
pub struct Allocation {
    env: *mut jvmti::jvmtiEnv,
    ptr: *mut u8,
    len: usize,
}

impl Allocation {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Gives up ownership; the VM frees the memory from now on.
    pub fn into_raw(self) -> (*mut u8, usize) {
        let raw = (self.ptr, self.len);
        std::mem::forget(self);
        raw
    }
}

impl AsRef<[u8]> for Allocation {
    fn as_ref(&self) -> &[u8] {
        if self.ptr.is_null() {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl AsMut<[u8]> for Allocation {
    fn as_mut(&mut self) -> &mut [u8] {
        if self.ptr.is_null() {
            return &mut [];
        }
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        let jvmti = unsafe { Jvmti::from_raw(self.env) };
        if let Err(e) = jvmti.deallocate(self.ptr) {
            log::warn!("Deallocate of {} byte buffer failed: {}", self.len, e);
        }
    }
}
