//! # jvmti-watermark
//!
//! A JVMTI agent that stamps a version counter and an installation record into
//! a test class every time the class is defined.
//!
//! The target class carries a marker string constant: a pattern repeated a
//! fixed number of times followed by one ASCII digit, e.g.
//!
//! ```text
//! xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx0
//! ```
//!
//! On each initial definition the agent finds the first occurrence of the
//! pattern, bumps the digit and writes `[prevVersion]JVMTI[identity]` into the
//! slot that belongs to the previous version. Loading the agent several times
//! with different identities produces a string that reads back as the exact
//! order in which the installs transformed the class:
//!
//! ```bash
//! java -agentpath:./libjvmti_watermark.so=a \
//!      -agentpath:./libjvmti_watermark.so=b \
//!      io.simonis.InstrumentationTest
//! # xxxxxxxx0JVMTIax1JVMTIbxxxxxxxxxxxxxxxxxxxxxxxxx2
//! ```
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          agent::WatermarkAgent (event handlers)          │
//! ├─────────────────────────────────────────────────────────┤
//! │   Agent trait, trampolines, agent_on_load, export_agent! │
//! ├─────────────────────────────────────────────────────────┤
//! │  marker / pattern / filter / identity / config / console │
//! ├─────────────────────────────────────────────────────────┤
//! │       source::EventSource  (Jvmti | HeapSource)          │
//! ├─────────────────────────────────────────────────────────┤
//! │        env::Jvmti safe wrapper over sys bindings         │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Each `Agent_OnLoad` gets its own JVMTI environment. The agent instance is
//! leaked and its address kept in that environment's local storage, so the
//! same shared library can be installed any number of times and every
//! callback finds the instance that registered it.

pub mod sys;
pub mod env;
pub mod error;

pub mod pattern;
pub mod marker;
pub mod filter;
pub mod identity;
pub mod config;
pub mod console;
pub mod source;
pub mod agent;

use std::ffi::CStr;
use std::os::raw::{c_char, c_uchar, c_void};
use std::ptr;

pub use crate::sys::jni;
use crate::sys::jvmti;

pub use crate::agent::WatermarkAgent;
pub use crate::console::Console;
pub use crate::env::{Allocation, Jvmti};
pub use crate::error::{AgentError, ConfigError, MarkerError};
pub use crate::source::{ClassEvent, ClassFileLoad, EventSource};

/// An agent that can be installed through [`export_agent!`].
///
/// `on_load` builds one instance per install. The instance is shared by all
/// event threads of its environment for the rest of the process, hence the
/// `Sync + Send + 'static` bounds.
pub trait Agent: Sync + Send + Sized + 'static {
    /// Builds the instance from the `-agentpath:...=<options>` string.
    /// An error aborts JVM startup.
    fn on_load(options: Option<&str>) -> Result<Self, AgentError>;

    /// Where startup diagnostics of this install are printed.
    fn console(&self) -> &Console;

    /// Called once all events are enabled.
    fn installed(&self) {}

    fn vm_init(&self, _jvmti: &Jvmti, _jni: *mut jni::JNIEnv, _thread: jni::jthread) {}

    /// The class is loaded but not yet linked.
    fn class_load(&self, _jvmti: &Jvmti, _jni: *mut jni::JNIEnv, _thread: jni::jthread, _klass: jni::jclass) {}

    /// The class is linked and ready to use.
    fn class_prepare(&self, _jvmti: &Jvmti, _jni: *mut jni::JNIEnv, _thread: jni::jthread, _klass: jni::jclass) {}

    /// Called with the bytes of a class being defined or redefined. A returned
    /// allocation replaces them; the VM takes ownership of it.
    fn class_file_load_hook(&self, _jvmti: &Jvmti, _load: &ClassFileLoad<'_>) -> Option<Allocation> {
        None
    }
}

/// Events every install enables, in registration order.
const EVENTS: [(u32, &str); 4] = [
    (jvmti::JVMTI_EVENT_VM_INIT, "JVMTI_EVENT_VM_INIT"),
    (jvmti::JVMTI_EVENT_CLASS_LOAD, "JVMTI_EVENT_CLASS_LOAD"),
    (jvmti::JVMTI_EVENT_CLASS_PREPARE, "JVMTI_EVENT_CLASS_PREPARE"),
    (jvmti::JVMTI_EVENT_CLASS_FILE_LOAD_HOOK, "JVMTI_EVENT_CLASS_FILE_LOAD_HOOK"),
];

/// The instance registered for `jvmti`'s environment.
///
/// # Safety
/// The environment's local storage must be unset or hold an `A` installed by
/// [`agent_on_load`].
unsafe fn instance<A: Agent>(jvmti: &Jvmti) -> Option<&'static A> {
    match jvmti.get_environment_local_storage() {
        Ok(data) if !data.is_null() => Some(&*(data as *const A)),
        Ok(_) => {
            log::error!("{}", AgentError::NoInstance);
            None
        }
        Err(error) => {
            log::error!("{}", AgentError::Jvmti { op: "GetEnvironmentLocalStorage", error });
            None
        }
    }
}

// --- Trampolines ---
// One monomorphized set per agent type; the instance comes from the
// environment the VM calls back on.

unsafe extern "system" fn trampoline_vm_init<A: Agent>(
    env: *mut jvmti::jvmtiEnv,
    jni: *mut jni::JNIEnv,
    thread: jni::jthread,
) {
    let jvmti = Jvmti::from_raw(env);
    if let Some(agent) = instance::<A>(&jvmti) {
        agent.vm_init(&jvmti, jni, thread);
    }
}

unsafe extern "system" fn trampoline_class_load<A: Agent>(
    env: *mut jvmti::jvmtiEnv,
    jni: *mut jni::JNIEnv,
    thread: jni::jthread,
    klass: jni::jclass,
) {
    let jvmti = Jvmti::from_raw(env);
    if let Some(agent) = instance::<A>(&jvmti) {
        agent.class_load(&jvmti, jni, thread, klass);
    }
}

unsafe extern "system" fn trampoline_class_prepare<A: Agent>(
    env: *mut jvmti::jvmtiEnv,
    jni: *mut jni::JNIEnv,
    thread: jni::jthread,
    klass: jni::jclass,
) {
    let jvmti = Jvmti::from_raw(env);
    if let Some(agent) = instance::<A>(&jvmti) {
        agent.class_prepare(&jvmti, jni, thread, klass);
    }
}

#[allow(clippy::too_many_arguments)]
unsafe extern "system" fn trampoline_class_file_load_hook<A: Agent>(
    env: *mut jvmti::jvmtiEnv,
    _jni: *mut jni::JNIEnv,
    class_being_redefined: jni::jclass,
    loader: jni::jobject,
    name: *const c_char,
    _protection_domain: jni::jobject,
    class_data_len: jni::jint,
    class_data: *const c_uchar,
    new_class_data_len: *mut jni::jint,
    new_class_data: *mut *mut c_uchar,
) {
    let jvmti = Jvmti::from_raw(env);
    let agent = match instance::<A>(&jvmti) {
        Some(agent) => agent,
        None => return,
    };

    let name = if name.is_null() { None } else { Some(CStr::from_ptr(name).to_bytes()) };
    let class_data = match usize::try_from(class_data_len) {
        Ok(len) if !class_data.is_null() => std::slice::from_raw_parts(class_data, len),
        _ => &[],
    };
    let load = ClassFileLoad {
        name,
        loader,
        being_redefined: !class_being_redefined.is_null(),
        class_data,
    };

    if let Some(buffer) = agent.class_file_load_hook(&jvmti, &load) {
        if new_class_data_len.is_null() || new_class_data.is_null() {
            log::error!("ClassFileLoadHook without output pointers, dropping rewritten {:?}", load);
            return;
        }
        let (data, len) = buffer.into_raw();
        // Same length as the input, which came in as a jint.
        *new_class_data_len = len as jni::jint;
        *new_class_data = data;
    }
}

/// The callback table routing the agent's four events to `A`.
pub fn callbacks<A: Agent>() -> jvmti::jvmtiEventCallbacks {
    let mut callbacks = jvmti::jvmtiEventCallbacks::default();

    callbacks.VMInit = Some(trampoline_vm_init::<A>);
    callbacks.ClassLoad = Some(trampoline_class_load::<A>);
    callbacks.ClassPrepare = Some(trampoline_class_prepare::<A>);
    callbacks.ClassFileLoadHook = Some(trampoline_class_file_load_hook::<A>);

    callbacks
}

/// Body of `Agent_OnLoad` for agent type `A`.
///
/// Builds the instance from `options`, obtains a fresh JVMTI environment,
/// stores the instance in it and enables [`EVENTS`]. Every failure is printed
/// and turns into `JNI_ERR`.
///
/// # Safety
/// `vm` must be the `JavaVM` handed to `Agent_OnLoad`; `options` is null or a
/// NUL-terminated string.
pub unsafe fn agent_on_load<A: Agent>(vm: *mut jni::JavaVM, options: *const c_char) -> jni::jint {
    // A second install in the same process finds the logger already set.
    let _ = env_logger::try_init();

    let options = if options.is_null() { None } else { Some(CStr::from_ptr(options).to_string_lossy()) };
    let agent = match A::on_load(options.as_deref()) {
        Ok(agent) => agent,
        Err(e) => {
            log::error!("Agent_OnLoad({:?}): {}", options, e);
            Console::stdio().diagnostic(format_args!("JVMTI - {}", e));
            return jni::JNI_ERR;
        }
    };

    let jvmti = match Jvmti::new(vm, jvmti::JVMTI_VERSION_1_1) {
        Ok(jvmti) => jvmti,
        Err(e) => {
            log::error!("{}", e);
            agent.console().diagnostic(format_args!("Can't access JVMTI!"));
            return jni::JNI_ERR;
        }
    };

    // Callbacks can arrive until the VM is gone, so the instance never is.
    let agent: &'static A = Box::leak(Box::new(agent));

    if let Err(e) = jvmti.set_environment_local_storage(agent as *const A as *const c_void) {
        return setup_failed(&jvmti, agent, "Can't store the agent instance!", e);
    }
    if let Err(e) = jvmti.set_event_callbacks(&callbacks::<A>()) {
        return setup_failed(&jvmti, agent, "Can't set event callbacks!", e);
    }
    for (event, name) in EVENTS {
        if let Err(e) = jvmti.set_event_notification_mode(true, event, ptr::null_mut()) {
            return setup_failed(&jvmti, agent, &format!("Can't enable {}!", name), e);
        }
    }

    agent.installed();
    jni::JNI_OK
}

fn setup_failed<A: Agent>(jvmti: &Jvmti, agent: &A, message: &str, error: jvmti::jvmtiError) -> jni::jint {
    let name = jvmti.get_error_name(error).unwrap_or_else(|_| error.to_string());
    log::error!("{} ({})", message, name);
    agent.console().diagnostic(format_args!("{}", message));
    jni::JNI_ERR
}

/// Body of `Agent_OnUnload`. Instances stay alive; the process is exiting.
pub fn agent_on_unload(_vm: *mut jni::JavaVM) {
    log::debug!("Agent_OnUnload");
}

/// Exports `Agent_OnLoad` and `Agent_OnUnload` for an [`Agent`] type.
///
/// ```rust,ignore
/// jvmti_watermark::export_agent!(MyAgent);
/// ```
///
/// The crate must be built as a `cdylib` for the JVM to load it with
/// `-agentpath:/path/to/lib<name>.so=<options>`.
#[macro_export]
macro_rules! export_agent {
    ($agent_type:ty) => {
        #[no_mangle]
        pub unsafe extern "system" fn Agent_OnLoad(
            vm: *mut $crate::sys::jni::JavaVM,
            options: *mut std::os::raw::c_char,
            _reserved: *mut std::os::raw::c_void,
        ) -> $crate::sys::jni::jint {
            $crate::agent_on_load::<$agent_type>(vm, options)
        }

        #[no_mangle]
        pub unsafe extern "system" fn Agent_OnUnload(vm: *mut $crate::sys::jni::JavaVM) {
            $crate::agent_on_unload(vm)
        }
    };
}

export_agent!(agent::WatermarkAgent);
