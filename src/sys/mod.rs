//! Raw FFI declarations for the parts of JNI and JVMTI the agent uses.

pub mod jni;
pub mod jvmti;
