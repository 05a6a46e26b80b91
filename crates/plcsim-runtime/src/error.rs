//! Error types for address resolution and call-frame management

use crate::operand::{Area, Offset};
use crate::scratch::ScratchError;
use std::fmt;
use thiserror::Error;

/// Failure to read or write one location
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("{area} {offset} ({width} bits) is outside the {size}-byte area")]
    OutOfRange {
        area: Area,
        offset: Offset,
        width: u32,
        size: usize,
    },

    #[error("data block {0} does not exist")]
    NoSuchDataBlock(u16),

    #[error("width of {width} bits is not addressable in {area}")]
    InvalidWidth { area: Area, width: u32 },

    #[error("{width}-bit access to {area} {offset} must be byte aligned")]
    MisalignedBit {
        area: Area,
        offset: Offset,
        width: u32,
    },

    #[error("value does not fit a {width}-bit location")]
    ValueMismatch { width: u32 },

    #[error("local data accessed without an active frame")]
    NoActiveFrame,

    #[error("outer local data accessed from the outermost frame")]
    NoOuterFrame,

    #[error("cannot store into a constant operand")]
    ImmediateStore,

    #[error("interface field {0} has no binding in the active frame")]
    UnboundInterfaceSlot(u32),

    #[error("invalid pointer: {0}")]
    InvalidPointer(String),
}

/// Where a call was issued, attached to every push failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSiteInfo {
    /// Label of the calling block, `None` for the root frame
    pub caller: Option<String>,
    /// Instruction pointer of the call within the caller
    pub ip: usize,
    /// Label of the called block
    pub callee: String,
}

impl fmt::Display for CallSiteInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.caller {
            Some(caller) => write!(f, "call of {} from {} at {}", self.callee, caller, self.ip),
            None => write!(f, "entry into {}", self.callee),
        }
    }
}

/// One output parameter that could not be copied back to its actual
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteBackFailure {
    pub field: String,
    pub actual: String,
    pub source: AddressError,
}

impl fmt::Display for WriteBackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}: {}", self.field, self.actual, self.source)
    }
}

/// Errors raised while pushing or popping frames
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("interface field {index} of {block} at {ip} is not bound")]
    UnresolvedInterfaceSlot { block: String, ip: usize, index: u32 },

    #[error("{site}: parameter '{field}' cannot take {actual}: {reason}")]
    UnsupportedBindingCombination {
        site: CallSiteInfo,
        field: String,
        actual: String,
        reason: String,
    },

    #[error("{site}: out of local stack{}: {source}", for_field(.field))]
    OutOfScratchSpace {
        site: CallSiteInfo,
        field: Option<String>,
        #[source]
        source: ScratchError,
    },

    #[error("{site}{}: {source}", for_field(.field))]
    Address {
        site: CallSiteInfo,
        field: Option<String>,
        #[source]
        source: AddressError,
    },

    #[error("{site}: call depth limit of {limit} reached")]
    CallDepthExceeded { site: CallSiteInfo, limit: usize },

    #[error("{site}: stateful block called without an instance")]
    MissingInstance { site: CallSiteInfo },

    #[error("call stack is empty")]
    EmptyCallStack,

    #[error("return from {block}: {} output parameter(s) not written back", .failures.len())]
    WriteBackFailed {
        block: String,
        failures: Vec<WriteBackFailure>,
    },
}

fn for_field(field: &Option<String>) -> String {
    match field {
        Some(name) => format!(" for parameter '{}'", name),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> CallSiteInfo {
        CallSiteInfo {
            caller: Some("OB 1".to_string()),
            ip: 12,
            callee: "FC 5".to_string(),
        }
    }

    #[test]
    fn test_error_display() {
        let err = CallError::Address {
            site: site(),
            field: Some("IN1".to_string()),
            source: AddressError::NoSuchDataBlock(9),
        };
        assert_eq!(
            err.to_string(),
            "call of FC 5 from OB 1 at 12 for parameter 'IN1': data block 9 does not exist"
        );
    }

    #[test]
    fn test_root_site_display() {
        let err = CallError::CallDepthExceeded {
            site: CallSiteInfo {
                caller: None,
                ip: 0,
                callee: "OB 1".to_string(),
            },
            limit: 1,
        };
        assert_eq!(err.to_string(), "entry into OB 1: call depth limit of 1 reached");
    }

    #[test]
    fn test_scratch_error_without_field() {
        let err = CallError::OutOfScratchSpace {
            site: site(),
            field: None,
            source: ScratchError::ReservationTooLarge {
                requested: 2000,
                capacity: 1024,
            },
        };
        assert!(err.to_string().starts_with("call of FC 5 from OB 1 at 12: out of local stack: "));
    }
}
