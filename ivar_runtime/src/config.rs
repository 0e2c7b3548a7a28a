//! Runtime configuration parameters.
//!
//! The defaults match a production runtime. Tests shrink the shape id space
//! to exercise the exhaustion fallback.

use std::env;

/// Number of dynamic shape ids in a default runtime.
///
/// Shape ids are 16 bits wide with `0xFFFF` kept invalid; three ids are
/// reserved for the root, frozen root and overflow shapes.
pub const DEFAULT_SHAPE_CAPACITY: u32 = 0xFFFE - 3;

/// Upper bound on the shape id space.
pub const MAX_SHAPE_CAPACITY: u32 = 1 << 24;

/// Environment variable overriding [`RuntimeConfig::shape_capacity`].
pub const ENV_SHAPE_CAPACITY: &str = "IVAR_SHAPE_CAPACITY";

/// Environment variable overriding [`RuntimeConfig::verify_class_ivars`].
pub const ENV_VERIFY_CLASS_IVARS: &str = "IVAR_VERIFY_CLASS_IVARS";

/// Configuration for a [`Runtime`](crate::Runtime).
///
/// # Example
///
/// ```ignore
/// use ivar_runtime::RuntimeConfig;
///
/// // Tiny id space to exercise the private index map path
/// let config = RuntimeConfig {
///     shape_capacity: 8,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    // =========================================================================
    // Shape Tree
    // =========================================================================
    /// Number of shape ids available to dynamically created shapes.
    ///
    /// Once all are in use, new transitions return the overflow shape and
    /// affected objects keep a private name→index map.
    ///
    /// Default: 65531
    pub shape_capacity: u32,

    // =========================================================================
    // Debugging
    // =========================================================================
    /// Cross-check class and module tables against their shape after each
    /// write.
    ///
    /// A key the shape path does not know about aborts the process.
    ///
    /// Default: false (enabled in debug builds)
    pub verify_class_ivars: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            shape_capacity: DEFAULT_SHAPE_CAPACITY,
            verify_class_ivars: cfg!(debug_assertions),
        }
    }
}

impl RuntimeConfig {
    /// Create a configuration with a custom shape id space.
    pub fn with_shape_capacity(shape_capacity: u32) -> Self {
        Self {
            shape_capacity,
            ..Default::default()
        }
    }

    /// Create a configuration from the defaults overridden by environment
    /// variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(raw) = env::var(ENV_SHAPE_CAPACITY) {
            config.shape_capacity = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv(ENV_SHAPE_CAPACITY))?;
        }
        if let Ok(raw) = env::var(ENV_VERIFY_CLASS_IVARS) {
            config.verify_class_ivars = parse_flag(&raw)
                .ok_or(ConfigError::InvalidEnv(ENV_VERIFY_CLASS_IVARS))?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shape_capacity == 0 {
            return Err(ConfigError::NoShapeCapacity);
        }
        if self.shape_capacity > MAX_SHAPE_CAPACITY {
            return Err(ConfigError::ShapeCapacityTooLarge);
        }
        Ok(())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The shape id space must hold at least one dynamic shape.
    NoShapeCapacity,
    /// The shape id space exceeds [`MAX_SHAPE_CAPACITY`].
    ShapeCapacityTooLarge,
    /// An environment override could not be parsed.
    InvalidEnv(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NoShapeCapacity => write!(f, "shape capacity must be at least 1"),
            ConfigError::ShapeCapacityTooLarge => {
                write!(f, "shape capacity must be at most {MAX_SHAPE_CAPACITY}")
            }
            ConfigError::InvalidEnv(var) => write!(f, "invalid value for {var}"),
        }
    }
}

impl std::error::Error for ConfigError {}
