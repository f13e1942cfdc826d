//! Identifier types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

/// Learner identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One of the three tubes every learner owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TubeId {
    Tube1,
    Tube2,
    Tube3,
}

impl TubeId {
    /// All tubes in index order.
    pub const ALL: [TubeId; 3] = [TubeId::Tube1, TubeId::Tube2, TubeId::Tube3];

    /// Zero-based index, for per-tube arrays.
    pub fn index(self) -> usize {
        match self {
            TubeId::Tube1 => 0,
            TubeId::Tube2 => 1,
            TubeId::Tube3 => 2,
        }
    }

    /// One-based tube number.
    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }

    /// Look up a tube by its one-based number.
    pub fn from_number(number: u8) -> Result<Self> {
        match number {
            1 => Ok(TubeId::Tube1),
            2 => Ok(TubeId::Tube2),
            3 => Ok(TubeId::Tube3),
            other => Err(SchedulerError::TubeNotFound(other.to_string())),
        }
    }
}

impl fmt::Display for TubeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tube{}", self.number())
    }
}

impl FromStr for TubeId {
    type Err = SchedulerError;

    /// Accepts `1`, `t1`, or `tube1`.
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let digits = lower
            .strip_prefix("tube")
            .or_else(|| lower.strip_prefix('t'))
            .unwrap_or(&lower);
        digits
            .parse::<u8>()
            .map_err(|_| SchedulerError::TubeNotFound(s.to_string()))
            .and_then(TubeId::from_number)
    }
}

/// Composite stitch key: owning tube, concept code, and creation order.
///
/// Rendered as `t<tube>:<concept>:<order>`, e.g. `t1:add-within-10:3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StitchId {
    pub tube: TubeId,
    pub concept: String,
    pub order: u32,
}

impl StitchId {
    pub fn new(tube: TubeId, concept: impl Into<String>, order: u32) -> Self {
        Self {
            tube,
            concept: concept.into(),
            order,
        }
    }
}

impl fmt::Display for StitchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}:{}:{}", self.tube.number(), self.concept, self.order)
    }
}

impl FromStr for StitchId {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || SchedulerError::StitchNotFound(StitchId::new(TubeId::Tube1, s, 0));

        let (tube, rest) = s.split_once(':').ok_or_else(invalid)?;
        let (concept, order) = rest.rsplit_once(':').ok_or_else(invalid)?;
        if concept.is_empty() {
            return Err(invalid());
        }
        let order = order.parse::<u32>().map_err(|_| invalid())?;

        Ok(Self::new(tube.parse()?, concept, order))
    }
}
