//! Metering blob decoding and level mapping.
//!
//! The console streams meter data as a single blob argument on the meter
//! block address. The blob is little-endian (unlike the big-endian message
//! framing around it):
//!
//! ```text
//! [i32 LE count] [i16 LE sample] x count
//! ```
//!
//! Each sample is a fixed-point level in 1/256 dB. This module turns blobs
//! into bounds-checked sample arrays and samples into normalized display
//! levels. The sample layout (which position belongs to which strip) is
//! observed device behavior, so it lives in a configurable [`MeterLayout`].

/// Size of the blob header (the sample count).
pub const METER_HEADER_SIZE: usize = 4;

/// Hard upper bound on samples decoded from one blob, whatever the header
/// claims.
pub const MAX_METER_SAMPLES: usize = 1024;

/// Display floor for return strips. Deeper, to show low-level detail.
pub const RETURN_FLOOR_DB: f32 = -90.0;

/// Display floor for channel strips. Shallower, so ambient noise does not
/// animate the bar.
pub const CHANNEL_FLOOR_DB: f32 = -60.0;

/// Threshold above which a sample counts as signal present. Deeper than
/// both display floors.
pub const SIGNAL_PRESENT_DB: f32 = -100.0;

/// A decoded meter blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterFrame {
    /// Raw samples in 1/256 dB units.
    pub values: Vec<i16>,
}

impl MeterFrame {
    /// Number of usable samples.
    pub fn count(&self) -> usize {
        self.values.len()
    }

    /// Raw sample at a position, if present.
    pub fn get(&self, position: usize) -> Option<i16> {
        self.values.get(position).copied()
    }

    /// The louder of two samples, for a stereo pair. `None` if either
    /// position is missing from this frame.
    pub fn stereo_max(&self, pair: (usize, usize)) -> Option<i16> {
        Some(self.get(pair.0)?.max(self.get(pair.1)?))
    }
}

/// Decode a meter blob into samples.
///
/// The usable sample count is `min(declared, available, MAX_METER_SAMPLES)`,
/// so a corrupt or hostile header can neither force a large allocation nor
/// cause a read past the end. Returns `None` for blobs shorter than the
/// header or with a negative count.
pub fn decode_meter_blob(blob: &[u8]) -> Option<MeterFrame> {
    let header: [u8; METER_HEADER_SIZE] = blob.get(..METER_HEADER_SIZE)?.try_into().ok()?;
    let declared = usize::try_from(i32::from_le_bytes(header)).ok()?;
    let available = (blob.len() - METER_HEADER_SIZE) / 2;
    let count = declared.min(available).min(MAX_METER_SAMPLES);

    if count < declared {
        tracing::trace!(
            declared = declared,
            available = available,
            count = count,
            "Meter blob sample count clamped"
        );
    }

    let values = blob[METER_HEADER_SIZE..METER_HEADER_SIZE + count * 2]
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    Some(MeterFrame { values })
}

/// Convert a raw sample to dB (1/256 dB per unit).
pub fn raw_to_db(raw: i16) -> f32 {
    raw as f32 / 256.0
}

/// Map a dB value to a normalized display level.
///
/// 0.0 at or below `floor_db`, 1.0 at or above 0 dB, linear in between.
/// `floor_db` must be negative.
pub fn db_to_level(db: f32, floor_db: f32) -> f32 {
    if db <= floor_db {
        0.0
    } else if db >= 0.0 {
        1.0
    } else {
        (db - floor_db) / -floor_db
    }
}

/// Whether a raw sample indicates signal present.
///
/// Computed from the sample itself, never from a floored display level, so
/// signal below the display floor is still reported.
pub fn signal_present(raw: i16) -> bool {
    raw_to_db(raw) > SIGNAL_PRESENT_DB
}

/// Sample positions for return and channel strips within one meter block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterLayout {
    /// Stereo `(left, right)` sample positions for return 1, 2, ...
    pub return_pairs: Vec<(usize, usize)>,
    /// Sample position of channel 1; channel `n` is at `channel_offset + n - 1`.
    pub channel_offset: usize,
}

impl MeterLayout {
    /// Sample pair for a 1-based return index.
    pub fn return_pair(&self, index: u8) -> Option<(usize, usize)> {
        (index as usize)
            .checked_sub(1)
            .and_then(|i| self.return_pairs.get(i))
            .copied()
    }

    /// Sample position for a 1-based channel index.
    pub fn channel_position(&self, index: u8) -> Option<usize> {
        (index as usize)
            .checked_sub(1)
            .map(|i| self.channel_offset + i)
    }
}

impl Default for MeterLayout {
    /// Layout of the `/meters/1` block on 18-input rack consoles: 16 mono
    /// channels, a stereo aux input, then the four stereo effect returns.
    fn default() -> Self {
        MeterLayout {
            return_pairs: vec![(18, 19), (20, 21), (22, 23), (24, 25)],
            channel_offset: 0,
        }
    }
}

/// Normalized level plus signal-present flag for one strip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StripLevel {
    pub level: f32,
    pub signal_present: bool,
}

impl StripLevel {
    /// Level for a mono sample against the given display floor.
    pub fn from_raw(raw: i16, floor_db: f32) -> Self {
        StripLevel {
            level: db_to_level(raw_to_db(raw), floor_db),
            signal_present: signal_present(raw),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
