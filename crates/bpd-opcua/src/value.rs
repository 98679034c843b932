//! Protocol-neutral node values.

/// A scalar read from, or reported by, a device node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeValue {
    /// Null / empty variant.
    Empty,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Anything else, rendered for diagnostics only.
    Other(String),
}

impl NodeValue {
    /// Numeric view used for front/rear measurements.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NodeValue::Int(v) => Some(*v as f64),
            NodeValue::UInt(v) => Some(*v as f64),
            NodeValue::Float(v) if v.is_finite() => Some(*v),
            _ => None,
        }
    }

    /// Non-negative integral view used for the reject counter.
    ///
    /// Negative, fractional, non-finite and non-numeric values yield `None`.
    pub fn as_counter(&self) -> Option<i64> {
        match self {
            NodeValue::Int(v) if *v >= 0 => Some(*v),
            NodeValue::UInt(v) => i64::try_from(*v).ok(),
            NodeValue::Float(v) if v.is_finite() && *v >= 0.0 && v.fract() == 0.0 => {
                if *v <= i64::MAX as f64 {
                    Some(*v as i64)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, NodeValue::Empty)
    }
}
