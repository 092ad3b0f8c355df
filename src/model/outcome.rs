//! Outcome: how an attempt ended.

use std::fmt;

/// Literal used for faulted attempts, both in the runlog and in replay names.
pub const FAULT_TAG: &str = "fault";

/// The decoded result of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A measured throw, in centimeters.
    Distance(u32),

    /// The throw was faulted.
    Fault,
}

impl Outcome {
    /// The replay filename tag: the distance zero-padded to `width`, or `fault`.
    pub fn tag(self, width: usize) -> String {
        match self {
            Self::Distance(cm) => format!("{cm:0>width$}"),
            Self::Fault => FAULT_TAG.to_string(),
        }
    }
}

/// Runlog form: meters with two decimals, or `fault`.
impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Distance(cm) => write!(f, "{}.{:02}", cm / 100, cm % 100),
            Self::Fault => f.write_str(FAULT_TAG),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_displays_as_meters() {
        assert_eq!(Outcome::Distance(8_123).to_string(), "81.23");
        assert_eq!(Outcome::Distance(905).to_string(), "9.05");
        assert_eq!(Outcome::Distance(7).to_string(), "0.07");
    }

    #[test]
    fn fault_displays_literal_tag() {
        assert_eq!(Outcome::Fault.to_string(), "fault");
    }

    #[test]
    fn tag_is_zero_padded() {
        assert_eq!(Outcome::Distance(42).tag(5), "00042");
        assert_eq!(Outcome::Distance(42).tag(3), "042");
        assert_eq!(Outcome::Distance(123_456).tag(5), "123456");
        assert_eq!(Outcome::Fault.tag(5), "fault");
    }
}
