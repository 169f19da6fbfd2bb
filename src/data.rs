//! # Draw protocol types
//!
//! The vocabulary shared between the test harness and the [`DataTree`]:
//!
//! - [`Status`]: how a single test run ended.
//! - [`Conclusion`]: a status together with the origin of an interesting failure.
//! - [`Draw`]: one bit-width-tagged choice made during a run.
//! - [`DataObserver`]: the event sink a harness feeds while a test runs.
//! - [`DrawSource`]: the harness side that hands out draws during simulation.
//!
//! [`DataTree`]: crate::datatree::DataTree

use std::fmt;

use crate::errors::FlakyError;

/// Status of a test run once it has finished.
/// Ordering matches the engine's: OVERRUN < INVALID < VALID < INTERESTING.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Status {
    /// The run needed more data than was available
    Overrun = 0,
    /// The run was rejected (failed assumption, filtered input)
    Invalid = 1,
    /// The run completed normally
    Valid = 2,
    /// The run found something the engine is looking for (usually a failure)
    Interesting = 3,
}

impl Default for Status {
    fn default() -> Self {
        Status::Valid
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Overrun => "Overrun",
            Status::Invalid => "Invalid",
            Status::Valid => "Valid",
            Status::Interesting => "Interesting",
        };
        f.write_str(name)
    }
}

/// The recorded outcome of a run.
///
/// `interesting_origin` distinguishes different interesting outcomes from each
/// other and is only retained when `status` is [`Status::Interesting`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Conclusion {
    pub status: Status,
    pub interesting_origin: Option<String>,
}

impl Conclusion {
    pub fn new(status: Status, interesting_origin: Option<String>) -> Self {
        let interesting_origin = match status {
            Status::Interesting => interesting_origin,
            Status::Overrun | Status::Invalid | Status::Valid => None,
        };
        Self {
            status,
            interesting_origin,
        }
    }

    /// Whether a run ending in `other` could be a replay of a run that ended in `self`.
    pub fn is_consistent_with(&self, other: &Conclusion) -> bool {
        if self.status != other.status {
            return false;
        }
        match self.status {
            Status::Interesting => self.interesting_origin == other.interesting_origin,
            Status::Overrun | Status::Invalid | Status::Valid => true,
        }
    }
}

impl From<Status> for Conclusion {
    fn from(status: Status) -> Self {
        Conclusion::new(status, None)
    }
}

impl fmt::Display for Conclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.interesting_origin {
            Some(origin) => write!(f, "{}({})", self.status, origin),
            None => write!(f, "{}", self.status),
        }
    }
}

/// A single choice made during a run: `value` is an integer of `bit_width` bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Draw {
    pub bit_width: u32,
    pub forced: bool,
    pub value: u64,
}

impl Draw {
    pub fn new(bit_width: u32, value: u64) -> Self {
        Self {
            bit_width,
            forced: false,
            value,
        }
    }

    pub fn forced(bit_width: u32, value: u64) -> Self {
        Self {
            bit_width,
            forced: true,
            value,
        }
    }
}

/// Largest value representable in `n_bits` bits.
pub fn mask(n_bits: u32) -> u64 {
    debug_assert!(n_bits <= 64, "draws are at most 64 bits wide, got {}", n_bits);
    if n_bits >= 64 {
        u64::MAX
    } else {
        (1u64 << n_bits) - 1
    }
}

/// Number of distinct values a draw of `n_bits` bits can take.
pub fn value_count(n_bits: u32) -> u128 {
    1u128 << n_bits.min(64)
}

/// Observer for the draws a single test run makes.
///
/// A run reports every draw in order and then concludes exactly once.
/// Drawing after concluding is a caller error and is not checked.
pub trait DataObserver {
    /// Called when `n_bits` bits are drawn and produce `value`
    fn draw_bits(&mut self, _n_bits: u32, _forced: bool, _value: u64) -> Result<(), FlakyError> {
        Ok(())
    }

    /// Called once when the run finishes
    fn conclude_test(
        &mut self,
        _status: Status,
        _interesting_origin: Option<String>,
    ) -> Result<(), FlakyError> {
        Ok(())
    }
}

/// Source of draws for a run being simulated against the tree.
pub trait DrawSource {
    /// Draw `n_bits` bits. When `forced` is set the source must produce that
    /// value. Returns `None` once the source has run out of data.
    fn draw_bits(&mut self, n_bits: u32, forced: Option<u64>) -> Option<u64>;
}
