//! ANSI color codes for DEX dumps.
//!
//! Three roles plus reset:
//! - Blue: class, method and field names
//! - Green: string constants and descriptors
//! - Dim: offsets, indices, section headers
//! - Reset: back to the terminal default

/// Palette used by the dump renderer.
///
/// Only standard 16-color ANSI codes, so dumps stay readable on light and
/// dark terminals alike.
#[derive(Clone, Copy, Debug)]
pub struct Colors {
    pub blue: &'static str,
    pub green: &'static str,
    pub dim: &'static str,
    pub reset: &'static str,
}

impl Default for Colors {
    fn default() -> Self {
        Self::OFF
    }
}

impl Colors {
    pub const ON: Self = Self {
        blue: "\x1b[34m",
        green: "\x1b[32m",
        dim: "\x1b[2m",
        reset: "\x1b[0m",
    };

    /// Plain text; every code is the empty string.
    pub const OFF: Self = Self {
        blue: "",
        green: "",
        dim: "",
        reset: "",
    };

    pub fn new(enabled: bool) -> Self {
        if enabled { Self::ON } else { Self::OFF }
    }

    pub fn is_enabled(&self) -> bool {
        !self.blue.is_empty()
    }

    /// Wrap a class/member name.
    pub fn name(&self, text: &str) -> String {
        format!("{}{}{}", self.blue, text, self.reset)
    }

    /// Wrap a string constant or descriptor.
    pub fn literal(&self, text: &str) -> String {
        format!("{}{}{}", self.green, text, self.reset)
    }

    /// Wrap structural metadata (offsets, indices).
    pub fn meta(&self, text: &str) -> String {
        format!("{}{}{}", self.dim, text, self.reset)
    }
}
