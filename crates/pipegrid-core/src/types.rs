//! Shared types used across pipegrid crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse capability class of a compute node.
///
/// Ordered: a node satisfies any requirement whose class is less than
/// or equal to its own.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CapacityClass {
    #[default]
    Small,
    Medium,
    Large,
}

impl CapacityClass {
    pub fn label(&self) -> &'static str {
        match self {
            CapacityClass::Small => "small",
            CapacityClass::Medium => "medium",
            CapacityClass::Large => "large",
        }
    }

    /// Whether a node of this class can host a component requiring `required`.
    pub fn satisfies(&self, required: CapacityClass) -> bool {
        *self >= required
    }
}

impl fmt::Display for CapacityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_ordering() {
        assert!(CapacityClass::Large.satisfies(CapacityClass::Small));
        assert!(CapacityClass::Medium.satisfies(CapacityClass::Medium));
        assert!(!CapacityClass::Small.satisfies(CapacityClass::Medium));
    }

    #[test]
    fn class_parses_snake_case() {
        #[derive(Deserialize)]
        struct Wrap {
            class: CapacityClass,
        }
        let wrap: Wrap = toml::from_str(r#"class = "large""#).unwrap();
        assert_eq!(wrap.class, CapacityClass::Large);
    }
}
