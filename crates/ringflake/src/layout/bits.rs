use core::fmt;

use crate::{Error, Result};

/// Total width of an identifier.
pub const TOTAL_BITS: u32 = u64::BITS;

/// Width of the reserved sign bit. It is always zero so ids stay positive when
/// stored as `i64`.
pub const SIGN_BITS: u32 = 1;

/// Default width of the timestamp-delta field (about 8.5 years of seconds).
pub const DEFAULT_TIMESTAMP_BITS: u32 = 28;

/// Default width of the worker-id field.
pub const DEFAULT_WORKER_ID_BITS: u32 = 22;

/// Default width of the sequence field (8192 ids per second).
pub const DEFAULT_SEQUENCE_BITS: u32 = 13;

/// Bit allocation for a second-resolution Snowflake-style identifier.
///
/// The layout is computed once from three field widths and is immutable
/// afterwards. With the defaults it looks like:
///
/// ```text
///  Bit Index:  63        63 62         35 34          13 12           0
///              +-----------+-------------+--------------+-------------+
///  Field:      | sign (1)  | delta (28)  | worker (22)  | sequence(13)|
///              +-----------+-------------+--------------+-------------+
///              |<----------- MSB -------- 64 bits ------- LSB ------->|
/// ```
///
/// # Example
///
/// ```
/// use ringflake::BitLayout;
///
/// let layout = BitLayout::new(28, 22, 13).unwrap();
/// let id = layout.encode(1000, 7, 3);
/// assert_eq!(layout.decode(id), (1000, 7, 3));
/// ```
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct BitLayout {
    timestamp_bits: u32,
    worker_id_bits: u32,
    sequence_bits: u32,

    max_delta_seconds: u64,
    max_worker_id: u64,
    max_sequence: u64,

    timestamp_shift: u32,
    worker_id_shift: u32,
}

impl BitLayout {
    /// Builds a layout from the three variable field widths.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] if any width is zero or if the widths
    /// plus the sign bit do not add up to exactly 64.
    pub fn new(timestamp_bits: u32, worker_id_bits: u32, sequence_bits: u32) -> Result<Self> {
        if timestamp_bits == 0 || worker_id_bits == 0 || sequence_bits == 0 {
            return Err(Error::config(format!(
                "bit widths must be positive, got (1, {timestamp_bits}, {worker_id_bits}, {sequence_bits})"
            )));
        }

        let allocated = SIGN_BITS
            .checked_add(timestamp_bits)
            .and_then(|n| n.checked_add(worker_id_bits))
            .and_then(|n| n.checked_add(sequence_bits));
        if allocated != Some(TOTAL_BITS) {
            return Err(Error::config(format!(
                "allocated bits (1, {timestamp_bits}, {worker_id_bits}, {sequence_bits}) must sum to {TOTAL_BITS}"
            )));
        }

        Ok(Self {
            timestamp_bits,
            worker_id_bits,
            sequence_bits,
            max_delta_seconds: mask(timestamp_bits),
            max_worker_id: mask(worker_id_bits),
            max_sequence: mask(sequence_bits),
            timestamp_shift: worker_id_bits + sequence_bits,
            worker_id_shift: sequence_bits,
        })
    }

    /// Packs the three fields into an identifier.
    ///
    /// Callers validate the inputs against the `max_*` accessors first. Out of
    /// range values trip a debug assertion and are masked in release builds.
    pub fn encode(&self, delta_seconds: u64, worker_id: u64, sequence: u64) -> u64 {
        debug_assert!(delta_seconds <= self.max_delta_seconds, "timestamp overflow");
        debug_assert!(worker_id <= self.max_worker_id, "worker_id overflow");
        debug_assert!(sequence <= self.max_sequence, "sequence overflow");

        ((delta_seconds & self.max_delta_seconds) << self.timestamp_shift)
            | ((worker_id & self.max_worker_id) << self.worker_id_shift)
            | (sequence & self.max_sequence)
    }

    /// Splits an identifier into `(delta_seconds, worker_id, sequence)`.
    pub const fn decode(&self, id: u64) -> (u64, u64, u64) {
        (
            self.delta_seconds_of(id),
            self.worker_id_of(id),
            self.sequence_of(id),
        )
    }

    /// Extracts the timestamp-delta field.
    pub const fn delta_seconds_of(&self, id: u64) -> u64 {
        (id >> self.timestamp_shift) & self.max_delta_seconds
    }

    /// Extracts the worker-id field.
    pub const fn worker_id_of(&self, id: u64) -> u64 {
        (id >> self.worker_id_shift) & self.max_worker_id
    }

    /// Extracts the sequence field.
    pub const fn sequence_of(&self, id: u64) -> u64 {
        id & self.max_sequence
    }

    pub const fn sign_bits(&self) -> u32 {
        SIGN_BITS
    }

    pub const fn timestamp_bits(&self) -> u32 {
        self.timestamp_bits
    }

    pub const fn worker_id_bits(&self) -> u32 {
        self.worker_id_bits
    }

    pub const fn sequence_bits(&self) -> u32 {
        self.sequence_bits
    }

    /// Largest encodable number of seconds since the epoch.
    pub const fn max_delta_seconds(&self) -> u64 {
        self.max_delta_seconds
    }

    pub const fn max_worker_id(&self) -> u64 {
        self.max_worker_id
    }

    pub const fn max_sequence(&self) -> u64 {
        self.max_sequence
    }

    /// Number of ids one worker can issue in one second.
    pub const fn ids_per_second(&self) -> u64 {
        self.max_sequence + 1
    }

    pub const fn timestamp_shift(&self) -> u32 {
        self.timestamp_shift
    }

    pub const fn worker_id_shift(&self) -> u32 {
        self.worker_id_shift
    }
}

impl Default for BitLayout {
    /// The `(1, 28, 22, 13)` layout.
    fn default() -> Self {
        Self {
            timestamp_bits: DEFAULT_TIMESTAMP_BITS,
            worker_id_bits: DEFAULT_WORKER_ID_BITS,
            sequence_bits: DEFAULT_SEQUENCE_BITS,
            max_delta_seconds: mask(DEFAULT_TIMESTAMP_BITS),
            max_worker_id: mask(DEFAULT_WORKER_ID_BITS),
            max_sequence: mask(DEFAULT_SEQUENCE_BITS),
            timestamp_shift: DEFAULT_WORKER_ID_BITS + DEFAULT_SEQUENCE_BITS,
            worker_id_shift: DEFAULT_SEQUENCE_BITS,
        }
    }
}

impl fmt::Debug for BitLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BitLayout(1, {}, {}, {})",
            self.timestamp_bits, self.worker_id_bits, self.sequence_bits
        )
    }
}

const fn mask(bits: u32) -> u64 {
    (1 << bits) - 1
}
