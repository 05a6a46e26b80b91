//! CPU specification
//!
//! The resolved, fully-populated set of machine dimensions. Configuration
//! files only ever carry partial [`CpuSection`]s; they are layered on top of
//! [`CpuSpecs::default`] by [`CpuSpecs::apply`].

use crate::project::CpuSection;
use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};

/// Largest local (scratch) stack a single frame may own, in bytes.
pub const MAX_LOCAL_BYTES: u32 = 0x1_0000;

/// Largest supported call nesting depth.
pub const MAX_CALL_DEPTH: usize = 4096;

/// Dimensions of a simulated CPU
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CpuSpecs {
    /// Size of each frame's local (scratch) stack in bytes
    pub local_bytes: u32,
    /// Maximum number of simultaneously active frames
    pub max_call_depth: usize,
    /// Size of the flag (marker) area in bytes
    pub flag_bytes: u32,
    /// Size of the process-image input area in bytes
    pub input_bytes: u32,
    /// Size of the process-image output area in bytes
    pub output_bytes: u32,
    /// Number of timer cells
    pub timers: u32,
    /// Number of counter cells
    pub counters: u32,
}

impl Default for CpuSpecs {
    fn default() -> Self {
        Self {
            local_bytes: 1024,
            max_call_depth: 256,
            flag_bytes: 8192,
            input_bytes: 8192,
            output_bytes: 8192,
            timers: 2048,
            counters: 2048,
        }
    }
}

impl CpuSpecs {
    /// Overlay every value present in `section`
    pub fn apply(&mut self, section: &CpuSection) {
        if let Some(v) = section.local_bytes {
            self.local_bytes = v;
        }
        if let Some(v) = section.max_call_depth {
            self.max_call_depth = v;
        }
        if let Some(v) = section.flag_bytes {
            self.flag_bytes = v;
        }
        if let Some(v) = section.input_bytes {
            self.input_bytes = v;
        }
        if let Some(v) = section.output_bytes {
            self.output_bytes = v;
        }
        if let Some(v) = section.timers {
            self.timers = v;
        }
        if let Some(v) = section.counters {
            self.counters = v;
        }
    }

    /// Validate the specification
    pub fn validate(&self) -> ConfigResult<()> {
        if self.local_bytes == 0 || self.local_bytes > MAX_LOCAL_BYTES {
            return Err(ConfigError::InvalidValue {
                field: "cpu.local_bytes".to_string(),
                reason: format!("must be within 1..={}", MAX_LOCAL_BYTES),
            });
        }
        if self.max_call_depth == 0 || self.max_call_depth > MAX_CALL_DEPTH {
            return Err(ConfigError::InvalidValue {
                field: "cpu.max_call_depth".to_string(),
                reason: format!("must be within 1..={}", MAX_CALL_DEPTH),
            });
        }
        // Timer and counter numbers are 16-bit operands.
        for (field, count) in [("cpu.timers", self.timers), ("cpu.counters", self.counters)] {
            if count > 0x1_0000 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: "at most 65536 cells are addressable".to_string(),
                });
            }
        }
        Ok(())
    }
}
