//! Measurement model: bases, preparations, raw outcomes, and histograms
//!
//! Single-qubit histograms use the labels `"0"` and `"1"`. Two-qubit
//! histograms use `"00"`, `"01"`, `"10"`, `"11"` with the gateway's bit first
//! and the device's bit second.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Measurement basis for prepare-and-measure circuits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Basis {
    /// Rectilinear (Z) basis
    Rectilinear,
    /// Diagonal (X) basis
    Diagonal,
}

impl Basis {
    /// Draw a basis uniformly at random
    pub fn sample(rng: &mut impl Rng) -> Self {
        if rng.gen_bool(0.5) {
            Self::Rectilinear
        } else {
            Self::Diagonal
        }
    }

    /// Single-letter label used in logs
    pub fn symbol(&self) -> char {
        match self {
            Self::Rectilinear => 'Z',
            Self::Diagonal => 'X',
        }
    }
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// One transmitted quantum state: a bit encoded in a basis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preparation {
    /// Encoded bit value
    pub bit: bool,
    /// Encoding basis
    pub basis: Basis,
}

impl Preparation {
    /// Create a preparation
    pub fn new(bit: bool, basis: Basis) -> Self {
        Self { bit, basis }
    }
}

/// Origin of an outcome, set only by simulated-attack test fixtures
///
/// Production logic never consults this flag; it exists so fixtures can label
/// corrupted traces when asserting that the statistics catch them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    /// Outcome produced by an honest channel
    #[default]
    Benign,
    /// Outcome produced under a simulated attack
    Adversarial,
}

/// One prepare-and-measure round as seen after decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOutcome {
    /// What the device transmitted
    pub sent: Preparation,
    /// Basis the gateway measured in
    pub measured_basis: Basis,
    /// Bit the gateway decoded
    pub measured_bit: bool,
    /// Origin flag for test fixtures
    #[serde(default)]
    pub provenance: Provenance,
}

impl RawOutcome {
    /// Whether sender and receiver used the same basis
    pub fn bases_match(&self) -> bool {
        self.sent.basis == self.measured_basis
    }
}

/// One retained bit of sifted key material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiftedBit {
    /// Index of the raw outcome this bit came from
    pub source_index: usize,
    /// Bit the device sent
    pub sent: bool,
    /// Bit the gateway measured
    pub measured: bool,
}

/// Histogram of measurement outcomes, keyed by bitstring label
///
/// Ordered map so iteration, serialization, and logs are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutcomeCounts(BTreeMap<String, u64>);

impl OutcomeCounts {
    /// Create an empty histogram
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Set the count for a label
    pub fn record(&mut self, label: impl Into<String>, count: u64) {
        self.0.insert(label.into(), count);
    }

    /// Add one occurrence of a label
    pub fn increment(&mut self, label: &str) {
        *self.0.entry(label.to_string()).or_insert(0) += 1;
    }

    /// Count for a label (zero when absent)
    pub fn get(&self, label: &str) -> u64 {
        self.0.get(label).copied().unwrap_or(0)
    }

    /// Total number of recorded shots
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    /// Whether the histogram holds no shots
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Majority-vote decode of a single-qubit histogram
    ///
    /// Returns `None` on an empty histogram. Ties break toward `false` so
    /// even shot counts decode deterministically. Not meaningful for
    /// two-qubit histograms.
    pub fn majority_bit(&self) -> Option<bool> {
        if self.is_empty() {
            return None;
        }
        Some(self.get("1") > self.get("0"))
    }

    /// Iterate over `(label, count)` pairs in label order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(label, count)| (label.as_str(), *count))
    }
}

impl From<BTreeMap<String, u64>> for OutcomeCounts {
    fn from(map: BTreeMap<String, u64>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, u64)> for OutcomeCounts {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
