//! Decoder, linker and engine settings. Plain values passed explicitly; nothing is global.

/// Decoder settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModuleConfig {
    /// Reject any `f32`/`f64` value type while decoding.
    pub disable_float_point: bool,
}

impl ModuleConfig {
    pub fn with_float_point_disabled(mut self, disabled: bool) -> Self {
        self.disable_float_point = disabled;
        self
    }
}

/// Execution limits applied to every instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub max_call_depth: usize,
    /// Operand-stack height, in values, across all active frames.
    pub max_stack_height: usize,
    /// Instruction budget; `None` runs unmetered.
    pub fuel: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 1024,
            max_stack_height: 1 << 20,
            fuel: None,
        }
    }
}

impl EngineConfig {
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_max_stack_height(mut self, height: usize) -> Self {
        self.max_stack_height = height;
        self
    }

    pub fn with_fuel(mut self, fuel: u64) -> Self {
        self.fuel = Some(fuel);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkerConfig {
    /// Fail on a second definition of the same `(module, name)` instead of replacing it.
    pub disable_shadowing: bool,
    pub engine: EngineConfig,
}

impl LinkerConfig {
    pub fn with_shadowing_disabled(mut self, disabled: bool) -> Self {
        self.disable_shadowing = disabled;
        self
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }
}
