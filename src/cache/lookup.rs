//! Lookup Outcomes
//!
//! Internal tagged result of a cache read. The public manager API collapses
//! it to `Option<Value>`.

use serde_json::Value;

use crate::error::Error;

/// Outcome of a multi-level read
#[derive(Debug)]
pub enum Lookup {
    /// Found at the given tier index (0 = highest priority)
    Hit { value: Value, level: usize },
    /// No tier held the key
    Miss,
    /// Configuration missing or inactive; no backend was contacted
    Disabled,
    /// Every tier that was tried failed
    Error(Error),
}

impl Lookup {
    /// Collapse to the public contract: anything but a hit is a miss
    pub fn into_value(self) -> Option<Value> {
        match self {
            Lookup::Hit { value, .. } => Some(value),
            Lookup::Miss | Lookup::Disabled | Lookup::Error(_) => None,
        }
    }

    /// Metrics label for this outcome
    pub fn label(&self) -> &'static str {
        match self {
            Lookup::Hit { .. } => "hit",
            Lookup::Miss => "miss",
            Lookup::Disabled => "disabled",
            Lookup::Error(_) => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collapse() {
        let hit = Lookup::Hit {
            value: json!({"id": 1}),
            level: 1,
        };
        assert_eq!(hit.label(), "hit");
        assert_eq!(hit.into_value(), Some(json!({"id": 1})));

        assert_eq!(Lookup::Miss.into_value(), None);
        assert_eq!(Lookup::Disabled.into_value(), None);
        assert_eq!(Lookup::Disabled.label(), "disabled");
        assert_eq!(Lookup::Error(Error::Internal("x".into())).label(), "error");
    }
}
