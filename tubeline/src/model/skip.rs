//! The fixed skip-number progression.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// Skip numbers in progression order.
pub const SKIP_SEQUENCE: [u32; 6] = [4, 8, 15, 30, 100, 1000];

/// A spaced-repetition interval from [`SKIP_SEQUENCE`].
///
/// The last step (1000) marks a stitch as retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum SkipNumber {
    Four,
    Eight,
    Fifteen,
    Thirty,
    Hundred,
    Thousand,
}

impl SkipNumber {
    const ORDERED: [SkipNumber; 6] = [
        SkipNumber::Four,
        SkipNumber::Eight,
        SkipNumber::Fifteen,
        SkipNumber::Thirty,
        SkipNumber::Hundred,
        SkipNumber::Thousand,
    ];

    /// The first step, used for new stitches and after any imperfect session.
    pub const fn first() -> Self {
        SkipNumber::Four
    }

    pub fn value(self) -> u32 {
        SKIP_SEQUENCE[self.step()]
    }

    /// Zero-based step within the sequence.
    pub fn step(self) -> usize {
        match self {
            SkipNumber::Four => 0,
            SkipNumber::Eight => 1,
            SkipNumber::Fifteen => 2,
            SkipNumber::Thirty => 3,
            SkipNumber::Hundred => 4,
            SkipNumber::Thousand => 5,
        }
    }

    /// The next step; the final step maps to itself.
    pub fn next(self) -> Self {
        Self::ORDERED[(self.step() + 1).min(Self::ORDERED.len() - 1)]
    }

    pub fn is_retired(self) -> bool {
        self == SkipNumber::Thousand
    }
}

impl Default for SkipNumber {
    fn default() -> Self {
        Self::first()
    }
}

impl TryFrom<u32> for SkipNumber {
    type Error = SchedulerError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        SKIP_SEQUENCE
            .iter()
            .position(|&v| v == value)
            .map(|step| Self::ORDERED[step])
            .ok_or(SchedulerError::InvalidSkipNumber(value))
    }
}

impl From<SkipNumber> for u32 {
    fn from(skip: SkipNumber) -> Self {
        skip.value()
    }
}

impl fmt::Display for SkipNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}
