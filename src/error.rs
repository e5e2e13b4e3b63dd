//! Error types for the script interpreter
//!
//! Almost every condition the VM can detect means a corrupted script or a
//! loader bug, so they are fatal: they travel up with `?` until they reach
//! [`report_fatal`]. The few recoverable ones are marked by [`VmError::is_fatal`].

use crate::resource::ResourceType;
use std::fmt;

pub type VmResult<T> = Result<T, VmError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    /// Undefined opcode byte at (script, offset)
    BadOpcode { opcode: u8, script: u16, pc: u16 },
    /// Kernel ordinal beyond the kernel table
    KernelOutOfRange(u16),
    /// Kernel ordinal inside the table but with no native function bound
    KernelNotImplemented(u16),
    /// Export index out of range, or an export that is not code
    BadExport { script: u16, index: u16 },
    /// A value used where an object was required
    NotAnObject(u16),
    /// Selector is neither a property nor a method anywhere in the chain
    BadSelector { object: u16, selector: u16 },
    /// Operand stack or dispatch depth exhausted
    StackBlown,
    ZeroDivide,
    ZeroModulo,
    /// Script disposed while clones of its objects are still alive
    LeftClone { script: u16, clones: u16 },
    /// Class id unknown to the class table
    BadClass(u16),
    /// Variable index outside its variable space
    BadVariable { space: &'static str, index: u16 },
    /// Resource layout the loader does not understand
    LoaderMismatch(String),
    Relocation(String),
    HeapExhausted { requested: usize },
    ResourceNotFound { kind: ResourceType, number: u16 },
    InstructionLimit(u64),
    Io(String),
    Config(String),
}

impl VmError {
    /// Recoverable conditions are surfaced to the caller; everything else
    /// terminates the interpreter.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            VmError::ResourceNotFound { .. }
                | VmError::InstructionLimit(_)
                | VmError::Io(_)
                | VmError::Config(_)
        )
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::BadOpcode { opcode, script, pc } => {
                write!(f, "bad opcode 0x{opcode:02x} at {script}:{pc:04x}")
            }
            VmError::KernelOutOfRange(n) => write!(f, "kernel call {n} out of range"),
            VmError::KernelNotImplemented(n) => write!(f, "kernel call {n} not implemented"),
            VmError::BadExport { script, index } => {
                write!(f, "bad dispatch index {index} in script {script}")
            }
            VmError::NotAnObject(v) => write!(f, "0x{v:04x} is not an object"),
            VmError::BadSelector { object, selector } => {
                write!(f, "object 0x{object:04x} does not understand selector {selector}")
            }
            VmError::StackBlown => write!(f, "stack blown"),
            VmError::ZeroDivide => write!(f, "zero divide"),
            VmError::ZeroModulo => write!(f, "zero modulo"),
            VmError::LeftClone { script, clones } => {
                write!(f, "script {script} disposed with {clones} clone(s) left")
            }
            VmError::BadClass(id) => write!(f, "bad class id {id}"),
            VmError::BadVariable { space, index } => {
                write!(f, "{space} variable {index} out of range")
            }
            VmError::LoaderMismatch(msg) => write!(f, "loader mismatch: {msg}"),
            VmError::Relocation(msg) => write!(f, "relocation failed: {msg}"),
            VmError::HeapExhausted { requested } => {
                write!(f, "heap exhausted allocating {requested} bytes")
            }
            VmError::ResourceNotFound { kind, number } => {
                write!(f, "resource {kind}.{number:03} not found")
            }
            VmError::InstructionLimit(n) => write!(f, "instruction limit of {n} reached"),
            VmError::Io(msg) => write!(f, "i/o error: {msg}"),
            VmError::Config(msg) => write!(f, "configuration error: {msg}"),
        }
    }
}

impl std::error::Error for VmError {}

impl From<std::io::Error> for VmError {
    fn from(e: std::io::Error) -> Self {
        VmError::Io(e.to_string())
    }
}

/// The one place fatal errors end up: log, tell the user, exit.
pub fn report_fatal(err: &VmError) -> ! {
    log::error!("fatal: {err}");
    eprintln!("\nError during execution: {err}");
    std::process::exit(1);
}
