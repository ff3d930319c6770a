//! Counter model: static parameter metadata and the per-parameter value
//! tracker every probe keeps.

use tracing::warn;

/// Static metadata for one monitored quantity.
///
/// An empty unit suppresses that value from the unit table, and an empty
/// `avg_unit` suppresses the average altogether.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    name: &'static str,
    max_unit: &'static str,
    avg_unit: &'static str,
}

impl Parameter {
    pub const fn new(name: &'static str, max_unit: &'static str, avg_unit: &'static str) -> Self {
        Self {
            name,
            max_unit,
            avg_unit,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn max_unit(&self) -> &'static str {
        self.max_unit
    }

    pub fn avg_unit(&self) -> &'static str {
        self.avg_unit
    }

    /// Whether this parameter's average is a rate (unit ends in `/s`).
    pub fn is_rate(&self) -> bool {
        self.avg_unit.ends_with("/s")
    }
}

/// Error type for rejected counter updates.
///
/// A rejected `set` leaves the value unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// The raw reading was below the configured offset.
    OffsetViolation {
        name: &'static str,
        raw: u64,
        offset: u64,
    },
    /// A monotonic value would have decreased.
    MonotonicityViolation {
        name: &'static str,
        current: u64,
        attempted: u64,
    },
    /// The offset was changed after values were recorded. The new offset
    /// is still applied.
    LateOffset { name: &'static str, offset: u64 },
}

impl std::fmt::Display for ValueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueError::OffsetViolation { name, raw, offset } => write!(
                f,
                "{}: raw value {} is below offset {}",
                name, raw, offset
            ),
            ValueError::MonotonicityViolation {
                name,
                current,
                attempted,
            } => write!(
                f,
                "{}: monotonic value would decrease from {} to {}",
                name, current, attempted
            ),
            ValueError::LateOffset { name, offset } => write!(
                f,
                "{}: offset set to {} after values were recorded",
                name, offset
            ),
        }
    }
}

impl std::error::Error for ValueError {}

/// Running state for one [`Parameter`].
///
/// Monotonic values only track the latest reading (which is also the
/// peak). Fluctuating values additionally accumulate a sum and sample count
/// for the average.
#[derive(Debug, Clone)]
pub struct MonitoredValue {
    param: Parameter,
    monotonic: bool,
    offset: u64,
    current: u64,
    peak: u64,
    sum: u64,
    iterations: u64,
}

impl MonitoredValue {
    pub fn new(param: Parameter, monotonic: bool, offset: u64) -> Self {
        Self {
            param,
            monotonic,
            offset,
            current: 0,
            peak: 0,
            sum: 0,
            iterations: 0,
        }
    }

    /// Accepts a raw reading, subtracting the offset.
    pub fn set(&mut self, raw: u64) -> Result<(), ValueError> {
        if raw < self.offset {
            return Err(ValueError::OffsetViolation {
                name: self.param.name,
                raw,
                offset: self.offset,
            });
        }
        let value = raw - self.offset;

        if self.monotonic {
            if value < self.current {
                return Err(ValueError::MonotonicityViolation {
                    name: self.param.name,
                    current: self.current,
                    attempted: value,
                });
            }
            self.current = value;
            self.peak = value;
        } else {
            self.current = value;
            self.peak = self.peak.max(value);
            self.sum = self.sum.saturating_add(value);
            self.iterations += 1;
        }
        Ok(())
    }

    /// Like [`set`](Self::set), but a rejected reading is logged and the
    /// last good value retained.
    ///
    /// A dropped monotonic counter (a lost or reset sample) therefore keeps
    /// reporting its previous peak.
    pub fn set_masked(&mut self, raw: u64) {
        if let Err(e) = self.set(raw) {
            warn!(parameter = self.param.name, "{}; keeping previous value", e);
        }
    }

    /// Changes the baseline subtracted from raw readings.
    ///
    /// Changing the offset after samples were accepted shifts the meaning
    /// of the accumulated peak and sum. The offset is applied anyway, a
    /// warning is logged and `LateOffset` returned.
    pub fn set_offset(&mut self, offset: u64) -> Result<(), ValueError> {
        let late = self.iterations > 0 || self.current > 0;
        self.offset = offset;
        if late {
            warn!(
                parameter = self.param.name,
                offset, "offset changed after values were recorded"
            );
            return Err(ValueError::LateOffset {
                name: self.param.name,
                offset,
            });
        }
        Ok(())
    }

    pub fn parameter(&self) -> &Parameter {
        &self.param
    }

    pub fn name(&self) -> &'static str {
        self.param.name
    }

    pub fn is_monotonic(&self) -> bool {
        self.monotonic
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn get(&self) -> u64 {
        self.current
    }

    pub fn peak(&self) -> u64 {
        self.peak
    }

    /// Sum of all accepted readings; always 0 for monotonic values.
    pub fn sum(&self) -> u64 {
        self.sum
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Mean of all accepted readings; 0 for monotonic values or before the
    /// first sample.
    pub fn average(&self) -> f64 {
        if self.monotonic || self.iterations == 0 {
            0.0
        } else {
            self.sum as f64 / self.iterations as f64
        }
    }
}
