//! Eisenhower quadrant classifier.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Eisenhower-matrix cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Quadrant {
    /// Important and urgent: do now.
    Q1,
    /// Important, not urgent: schedule.
    Q2,
    /// Urgent, not important: delegate.
    Q3,
    /// Neither: drop.
    Q4,
}

impl Quadrant {
    /// All quadrants in matrix order.
    pub const ALL: [Quadrant; 4] = [Self::Q1, Self::Q2, Self::Q3, Self::Q4];

    /// Stable string id used in storage and filters.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Q1 => "Q1",
            Self::Q2 => "Q2",
            Self::Q3 => "Q3",
            Self::Q4 => "Q4",
        }
    }

    /// Strict parse of the stable string id.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Q1" => Some(Self::Q1),
            "Q2" => Some(Self::Q2),
            "Q3" => Some(Self::Q3),
            "Q4" => Some(Self::Q4),
            _ => None,
        }
    }

    pub fn is_important(self) -> bool {
        matches!(self, Self::Q1 | Self::Q2)
    }

    pub fn is_urgent(self) -> bool {
        matches!(self, Self::Q1 | Self::Q3)
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Q1 => 0,
            Self::Q2 => 1,
            Self::Q3 => 2,
            Self::Q4 => 3,
        }
    }
}

impl Display for Quadrant {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps importance and urgency to a quadrant.
///
/// Total over all four inputs; every write path derives `quadrant` here.
pub fn classify(important: bool, urgent: bool) -> Quadrant {
    match (important, urgent) {
        (true, true) => Quadrant::Q1,
        (true, false) => Quadrant::Q2,
        (false, true) => Quadrant::Q3,
        (false, false) => Quadrant::Q4,
    }
}
