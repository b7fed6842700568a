//! Error taxonomy shared by every layer of the core.

use thiserror::Error;

/// Failure to turn a file or byte buffer into a playable cartridge image.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid cartridge image: {0}")]
    InvalidImage(String),
    #[error("failed to read ROM file: {0}")]
    Io(#[from] std::io::Error),
    #[error("ROM load cancelled")]
    Cancelled,
    #[error("emulation thread is not running")]
    Disconnected,
}

/// A bus access that violates the memory map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FaultError {
    #[error("unmapped address {address:#010x}")]
    UnmappedAddress { address: u32 },
    #[error("misaligned {width}-byte access at {address:#010x}")]
    Misaligned { address: u32, width: u8 },
    #[error("write to read-only address {address:#010x}")]
    ReadOnly { address: u32 },
}

impl FaultError {
    pub fn address(&self) -> u32 {
        match *self {
            FaultError::UnmappedAddress { address }
            | FaultError::Misaligned { address, .. }
            | FaultError::ReadOnly { address } => address,
        }
    }

    /// The same fault reported against `address`.
    pub fn at(self, address: u32) -> FaultError {
        match self {
            FaultError::UnmappedAddress { .. } => FaultError::UnmappedAddress { address },
            FaultError::Misaligned { width, .. } => FaultError::Misaligned { address, width },
            FaultError::ReadOnly { .. } => FaultError::ReadOnly { address },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("illegal opcode {word:#010x}")]
    IllegalOpcode { word: u32 },
}

/// Architectural exceptions. Exception delivery is not modelled, so each of
/// these stops the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    IntegerOverflow,
    Trap,
    Syscall,
    Breakpoint,
    CoprocessorUnusable(u8),
}

impl ExceptionKind {
    /// ExcCode field value for COP0 Cause.
    pub fn code(self) -> u32 {
        match self {
            ExceptionKind::Syscall => 8,
            ExceptionKind::Breakpoint => 9,
            ExceptionKind::CoprocessorUnusable(_) => 11,
            ExceptionKind::IntegerOverflow => 12,
            ExceptionKind::Trap => 13,
        }
    }
}

impl std::fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExceptionKind::IntegerOverflow => write!(f, "integer overflow"),
            ExceptionKind::Trap => write!(f, "trap"),
            ExceptionKind::Syscall => write!(f, "syscall"),
            ExceptionKind::Breakpoint => write!(f, "breakpoint"),
            ExceptionKind::CoprocessorUnusable(n) => write!(f, "coprocessor {} unusable", n),
        }
    }
}

/// A fatal condition raised by one fetch/decode/execute step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExecutionFault {
    #[error("memory fault at pc {pc:#010x}: {source}")]
    Memory {
        pc: u32,
        #[source]
        source: FaultError,
    },
    #[error("decode fault at pc {pc:#010x}: {source}")]
    Decode {
        pc: u32,
        #[source]
        source: DecodeError,
    },
    #[error("{kind} exception at pc {pc:#010x}")]
    Exception { pc: u32, kind: ExceptionKind },
}

impl ExecutionFault {
    pub fn pc(&self) -> u32 {
        match *self {
            ExecutionFault::Memory { pc, .. }
            | ExecutionFault::Decode { pc, .. }
            | ExecutionFault::Exception { pc, .. } => pc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("no ROM loaded")]
    NoRomLoaded,
    #[error("emulation is already running")]
    AlreadyRunning,
    #[error("emulation is not running")]
    NotRunning,
    #[error("session is faulted; reset required")]
    Faulted,
    #[error("emulation thread is not running")]
    Disconnected,
}
