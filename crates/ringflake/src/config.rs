use serde::{Deserialize, Serialize};

use crate::{
    BitLayout, CUSTOM_EPOCH, DEFAULT_SEQUENCE_BITS, DEFAULT_TIMESTAMP_BITS, DEFAULT_WORKER_ID_BITS,
    Error, Result,
};

/// Default ring buffer multiplier: `(max_sequence + 1) << 3`.
pub const DEFAULT_BOOST_POWER: u32 = 3;

/// Refill once fewer than this percent of the ring buffer holds ready ids.
pub const DEFAULT_PADDING_THRESHOLD_PERCENT: u32 = 50;

/// Scheduled padding interval: 5 minutes.
pub const DEFAULT_SCHEDULE_INTERVAL_SECONDS: u64 = 5 * 60;

/// Number of threads executing asynchronous padding passes.
pub const DEFAULT_PADDING_WORKERS: usize = 4;

/// Largest supported boost power. Keeps the buffer addressable on 64-bit
/// targets with the widest sequence fields.
const MAX_BUFFER_BITS: u32 = 32;

/// Parameters consumed by [`CachedUidGenerator`](crate::CachedUidGenerator)
/// at construction.
///
/// Every field has a default, so partial documents deserialize cleanly:
///
/// ```
/// use ringflake::UidConfig;
///
/// let config: UidConfig = serde_json::from_str(r#"{"boost_power": 1}"#).unwrap();
/// assert_eq!(config.boost_power, 1);
/// assert_eq!(config.sequence_bits, 13);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UidConfig {
    pub timestamp_bits: u32,
    pub worker_id_bits: u32,
    pub sequence_bits: u32,
    /// Zero point of the timestamp field, in Unix seconds.
    pub epoch_seconds: i64,
    /// The ring buffer holds `(max_sequence + 1) << boost_power` ids.
    pub boost_power: u32,
    /// Percent in `1..=100`. When the fill level drops below this share of the
    /// buffer, a take schedules an asynchronous refill.
    pub padding_threshold_percent: u32,
    /// Interval of the scheduled padding safety net. `0` disables it.
    pub schedule_interval_seconds: u64,
    pub padding_workers: usize,
}

impl Default for UidConfig {
    fn default() -> Self {
        Self {
            timestamp_bits: DEFAULT_TIMESTAMP_BITS,
            worker_id_bits: DEFAULT_WORKER_ID_BITS,
            sequence_bits: DEFAULT_SEQUENCE_BITS,
            epoch_seconds: CUSTOM_EPOCH.as_secs() as i64,
            boost_power: DEFAULT_BOOST_POWER,
            padding_threshold_percent: DEFAULT_PADDING_THRESHOLD_PERCENT,
            schedule_interval_seconds: DEFAULT_SCHEDULE_INTERVAL_SECONDS,
            padding_workers: DEFAULT_PADDING_WORKERS,
        }
    }
}

impl UidConfig {
    pub const fn with_bits(mut self, timestamp: u32, worker_id: u32, sequence: u32) -> Self {
        self.timestamp_bits = timestamp;
        self.worker_id_bits = worker_id;
        self.sequence_bits = sequence;
        self
    }

    pub const fn with_epoch_seconds(mut self, epoch_seconds: i64) -> Self {
        self.epoch_seconds = epoch_seconds;
        self
    }

    pub const fn with_boost_power(mut self, boost_power: u32) -> Self {
        self.boost_power = boost_power;
        self
    }

    pub const fn with_padding_threshold_percent(mut self, percent: u32) -> Self {
        self.padding_threshold_percent = percent;
        self
    }

    pub const fn with_schedule_interval_seconds(mut self, seconds: u64) -> Self {
        self.schedule_interval_seconds = seconds;
        self
    }

    pub const fn with_padding_workers(mut self, workers: usize) -> Self {
        self.padding_workers = workers;
        self
    }

    /// Builds the [`BitLayout`] described by this config.
    ///
    /// # Errors
    ///
    /// See [`BitLayout::new`].
    pub fn layout(&self) -> Result<BitLayout> {
        BitLayout::new(self.timestamp_bits, self.worker_id_bits, self.sequence_bits)
    }

    /// Number of slots in the ring buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] if the layout is invalid or the buffer
    /// would be unreasonably large.
    pub fn buffer_size(&self) -> Result<usize> {
        let layout = self.layout()?;
        let bits = layout.sequence_bits() + self.boost_power;
        if bits > MAX_BUFFER_BITS || bits >= usize::BITS {
            return Err(Error::config(format!(
                "ring buffer of 2^{bits} slots is too large (sequence bits {} + boost power {})",
                layout.sequence_bits(),
                self.boost_power
            )));
        }
        Ok(1usize << bits)
    }

    /// Checks every field, returning the first problem found.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] describing the rejected value.
    pub fn validate(&self) -> Result<()> {
        self.buffer_size()?;

        if self.padding_threshold_percent == 0 || self.padding_threshold_percent > 100 {
            return Err(Error::config(format!(
                "padding threshold percent must be in 1..=100, got {}",
                self.padding_threshold_percent
            )));
        }

        if self.padding_workers == 0 {
            return Err(Error::config("padding workers must be greater than 0"));
        }

        if self.epoch_seconds < 0 {
            return Err(Error::config(format!(
                "epoch must not precede 1970-01-01, got {}",
                self.epoch_seconds
            )));
        }

        Ok(())
    }
}
