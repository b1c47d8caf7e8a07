//! Event handlers of one agent install.
//!
//! For a given class the VM goes `Unseen -> Loaded -> Prepared`, reported by
//! ClassLoad and ClassPrepare; those two only log. ClassFileLoadHook fires
//! independently, once for the initial definition and once per
//! redefinition/retransformation, and is the only place bytes change.
//!
//! By default only the initial definition is rewritten. Redefinitions pass
//! through with their bytes untouched, so the marker string records the
//! sequence of definitions seen by the installs active at load time. With
//! `redefine=transform` every definition is stamped and the FileLoad line
//! says which kind it was (`load` or `re-define/transform`).
//!
//! ```text
//! JVMTI - FileLoad:     io/simonis/InstrumentationTest (0x7f3a2c00d8e0)
//! JVMTI - FileLoad:     io/simonis/InstrumentationTest ((nil)) re-define/transform
//! ```

use std::fmt;

use log::{debug, warn};

use crate::config::{AgentConfig, RedefinePolicy};
use crate::console::Console;
use crate::env::{Allocation, Jvmti};
use crate::error::AgentError;
use crate::identity::InstallationIdentity;
use crate::source::{ClassEvent, ClassFileLoad, EventSource};
use crate::sys::jni;
use crate::Agent;

/// One install of the agent: its configuration (including the identity)
/// and the console it reports to. Immutable once created; shared read-only
/// by every callback thread.
#[derive(Debug)]
pub struct WatermarkAgent {
    config: AgentConfig,
    console: Console,
}

impl WatermarkAgent {
    pub fn new(config: AgentConfig, console: Console) -> Self {
        Self { config, console }
    }

    pub fn identity(&self) -> InstallationIdentity {
        self.config.identity
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn report_installed(&self) {
        self.console.status(format_args!(
            "JVMTI - agent  {} for  {} installed",
            self.identity(),
            self.config.filter.prefix()
        ));
    }

    pub fn on_vm_init(&self) {
        self.console.status(format_args!("JVMTI - VMInit {}", self.identity()));
    }

    /// ClassLoad / ClassPrepare: print the class if it is a target.
    pub fn on_class_event<S: EventSource>(&self, source: &S, kind: ClassEvent, klass: jni::jclass) {
        let signature = match source.class_signature(klass) {
            Ok(signature) => signature,
            Err(e) => {
                debug!("{:?} of {:p}: {}", kind, klass, e);
                self.console.diagnostic(format_args!(
                    "{}Can't get class signature of {:p}",
                    kind.tag(),
                    klass
                ));
                return;
            }
        };
        if let Some(name) = self.config.filter.signature_target(&signature) {
            self.console.status(format_args!("{}{}", kind.tag(), name));
        }
    }

    /// ClassFileLoadHook: returns the replacement class bytes, or `None` to
    /// leave the VM's bytes in effect.
    pub fn on_class_file_load<S: EventSource>(&self, source: &S, load: &ClassFileLoad<'_>) -> Option<S::Buffer> {
        let name = load.name?;
        if !self.config.filter.is_target(name) {
            return None;
        }
        let name = String::from_utf8_lossy(name);
        let loader = Loader(load.loader);
        match self.config.redefine {
            RedefinePolicy::Skip => {
                self.console.status(format_args!("JVMTI - FileLoad:     {} ({})", name, loader));
                if load.being_redefined {
                    debug!("{} is being redefined, passing through", name);
                    return None;
                }
            }
            RedefinePolicy::Transform => {
                let kind = if load.being_redefined { "re-define/transform" } else { "load" };
                self.console.status(format_args!("JVMTI - FileLoad:     {} ({}) {}", name, loader, kind));
            }
        }

        let len = load.class_data.len();
        let mut buffer = match source.allocate(len) {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!("{}: {}", name, e);
                self.console.diagnostic(format_args!("jvmti->Allocate({}) failed", len));
                return None;
            }
        };
        buffer.as_mut().copy_from_slice(load.class_data);

        match self.config.layout.stamp(buffer.as_mut(), self.identity()) {
            Ok(Some(record)) => {
                debug!(
                    "{}: version {} -> {}, record at +{} by '{}'",
                    name,
                    record.previous_version as char,
                    record.new_version() as char,
                    record.slot - record.match_offset,
                    self.identity()
                );
            }
            Ok(None) => debug!("{}: no marker string, handing back an unchanged copy", name),
            Err(e) => {
                let e = AgentError::from(e);
                warn!("{}: {}", name, e);
                self.console.diagnostic(format_args!("JVMTI - {} not transformed: {}", name, e));
                return None;
            }
        }
        Some(buffer)
    }
}

/// A loader reference as glibc's `%p` prints it: the bootstrap loader is
/// null and shows as `(nil)`.
struct Loader(jni::jobject);

impl fmt::Display for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_null() {
            f.write_str("(nil)")
        } else {
            write!(f, "{:p}", self.0)
        }
    }
}

impl Agent for WatermarkAgent {
    fn on_load(options: Option<&str>) -> Result<Self, AgentError> {
        let config = AgentConfig::from_options(options)?;
        Ok(Self::new(config, Console::stdio()))
    }

    fn console(&self) -> &Console {
        &self.console
    }

    fn installed(&self) {
        self.report_installed();
    }

    fn vm_init(&self, _jvmti: &Jvmti, _jni: *mut jni::JNIEnv, _thread: jni::jthread) {
        self.on_vm_init();
    }

    fn class_load(&self, jvmti: &Jvmti, _jni: *mut jni::JNIEnv, _thread: jni::jthread, klass: jni::jclass) {
        self.on_class_event(jvmti, ClassEvent::Load, klass);
    }

    fn class_prepare(&self, jvmti: &Jvmti, _jni: *mut jni::JNIEnv, _thread: jni::jthread, klass: jni::jclass) {
        self.on_class_event(jvmti, ClassEvent::Prepare, klass);
    }

    fn class_file_load_hook(&self, jvmti: &Jvmti, load: &ClassFileLoad<'_>) -> Option<Allocation> {
        self.on_class_file_load(jvmti, load)
    }
}
