//! Crate-wide error taxonomy.
//!
//! Every fallible subsystem operation returns `Result<T, KernelError>` instead
//! of a raw errno integer. Subsystem-local error enums (`VfsError`, `MbrError`)
//! convert into this one via `From` so callers at a subsystem boundary can
//! propagate with `?` without losing the specific cause.

use crate::mbr::MbrError;
use crate::vfs::VfsError;
use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Bad pointer, misaligned address, or a fault the CPU reported.
    Fault,
    /// Physical/virtual memory, heap, or descriptor-table exhaustion.
    OutOfMemory,
    /// Path component expected a directory but found something else.
    NotADirectory,
    /// Target of a create already exists.
    AlreadyExists,
    /// Lookup failed.
    NotFound,
    /// Caller lacks permission for the requested operation.
    PermissionDenied,
    /// Argument outside its valid domain.
    InvalidArgument,
    /// Underlying device or medium reported an error.
    IoError,
    /// The operation is not implemented by this backend.
    NotSupported,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            KernelError::Fault => "EFAULT: bad address",
            KernelError::OutOfMemory => "ENOMEM: out of memory",
            KernelError::NotADirectory => "ENOTDIR: not a directory",
            KernelError::AlreadyExists => "EEXIST: already exists",
            KernelError::NotFound => "ENOENT: not found",
            KernelError::PermissionDenied => "EPERM: permission denied",
            KernelError::InvalidArgument => "EINVAL: invalid argument",
            KernelError::IoError => "EIO: i/o error",
            KernelError::NotSupported => "ENOSYS: not supported",
        };
        f.write_str(s)
    }
}

pub type KernelResult<T> = Result<T, KernelError>;

impl From<VfsError> for KernelError {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound => KernelError::NotFound,
            VfsError::AlreadyExists => KernelError::AlreadyExists,
            VfsError::NotADirectory => KernelError::NotADirectory,
            VfsError::IsADirectory => KernelError::InvalidArgument,
            VfsError::PermissionDenied => KernelError::PermissionDenied,
            VfsError::InvalidArgument => KernelError::InvalidArgument,
            VfsError::IoError => KernelError::IoError,
            VfsError::NotImplemented => KernelError::NotSupported,
        }
    }
}

impl From<MbrError> for KernelError {
    fn from(e: MbrError) -> Self {
        match e {
            MbrError::BadSignature => KernelError::InvalidArgument,
        }
    }
}
