/// Interpreter configuration
///
/// Loaded from a TOML file (`scivm.toml` by convention). Every field has a
/// default so an empty file, or no file at all, gives a working setup.
use crate::error::{VmError, VmResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct VmConfig {
    /// Directory holding resource patch files (`script.000`, `vocab.996`, ...)
    pub resource_dir: PathBuf,
    /// Size of the heap arena in bytes (at most 0xFFFE, addresses are 16-bit)
    pub heap_size: usize,
    /// Size of the call stack in bytes, carved out of the heap
    pub stack_size: usize,
    /// Maximum nesting of send/call before the stack counts as blown
    pub max_call_depth: usize,
    /// Resident byte budget of the resource cache
    pub cache_budget: usize,
    /// Number of slots in the kernel call table
    pub kernel_table_size: usize,
    /// Timer rate driving GetTime and tick hooks
    pub tick_rate_hz: u32,
    /// Fixed seed for the Random kernel; unset means nondeterministic
    pub random_seed: Option<u64>,
    /// Selector sent to the game object at start when vocab 997 has no "play"
    pub play_selector: u16,
    /// Stop after this many instructions
    pub instruction_limit: Option<u64>,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            resource_dir: PathBuf::from("."),
            heap_size: 0xFFFE,
            stack_size: 0x1000,
            max_call_depth: 256,
            cache_budget: 512 * 1024,
            kernel_table_size: 128,
            tick_rate_hz: 60,
            random_seed: None,
            play_selector: 42,
            instruction_limit: None,
        }
    }
}

impl VmConfig {
    pub fn from_toml_str(text: &str) -> VmResult<Self> {
        let config: VmConfig =
            toml::from_str(text).map_err(|e| VmError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> VmResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| VmError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> VmResult<()> {
        if self.heap_size > 0xFFFE || self.heap_size < 0x100 {
            return Err(VmError::Config(format!(
                "heap_size {} must be between 256 and 65534",
                self.heap_size
            )));
        }
        if self.stack_size % 2 != 0 || self.stack_size >= self.heap_size {
            return Err(VmError::Config(format!(
                "stack_size {} must be even and smaller than the heap",
                self.stack_size
            )));
        }
        if self.tick_rate_hz == 0 {
            return Err(VmError::Config("tick_rate_hz must be positive".to_string()));
        }
        Ok(())
    }
}
