//! SMPTE timecode arithmetic
//!
//! A [`Timecode`] is canonically a frame number counted from midnight under
//! a [`Framerate`]; the `HH:MM:SS:FF` text form is derived on demand. Drop
//! frame is purely a labelling concern: for 29.97 and 59.94 certain labels
//! do not exist, but the frame count itself is contiguous, so arithmetic
//! stays O(1).

pub mod framerate;

pub use framerate::Framerate;

use std::fmt;

/// Errors from parsing or constructing a timecode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimecodeError {
    /// Text is not four two-digit colon-separated fields
    #[error("invalid timecode format, expected HH:MM:SS:FF")]
    InvalidFormat,

    /// A field is outside its legal range
    #[error("timecode field {field} out of range: {value}")]
    FieldOutOfRange {
        /// Which field was rejected
        field: &'static str,
        /// The rejected value
        value: u32,
    },

    /// The label names a frame skipped by drop-frame counting
    #[error("dropped frame label at this framerate: {text}")]
    DroppedFrame {
        /// The rejected label
        text: String,
    },
}

/// A frame-accurate timecode under a specific framerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timecode {
    frame: u64,
    rate: Framerate,
}

impl Timecode {
    /// Timecode at `frame` (wrapped into the 24-hour range) under `rate`.
    #[must_use]
    pub fn new(frame: u64, rate: Framerate) -> Self {
        Self {
            frame: frame % rate.frames_per_day(),
            rate,
        }
    }

    /// Midnight (`00:00:00:00`) under `rate`.
    #[must_use]
    pub fn zero(rate: Framerate) -> Self {
        Self { frame: 0, rate }
    }

    /// Parse an `HH:MM:SS:FF` label.
    ///
    /// Each field must be exactly two decimal digits. Out-of-range fields
    /// and, for drop-frame rates, labels that name a dropped frame are
    /// rejected.
    ///
    /// # Errors
    /// Returns [`TimecodeError`] describing the first rejected property.
    pub fn parse(text: &str, rate: Framerate) -> Result<Self, TimecodeError> {
        let mut fields = [0u32; 4];
        let mut parts = text.split(':');
        for slot in &mut fields {
            let part = parts.next().ok_or(TimecodeError::InvalidFormat)?;
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(TimecodeError::InvalidFormat);
            }
            *slot = part.parse().map_err(|_| TimecodeError::InvalidFormat)?;
        }
        if parts.next().is_some() {
            return Err(TimecodeError::InvalidFormat);
        }

        let [h, m, s, f] = fields;
        Self::from_fields(h, m, s, f, rate)
    }

    /// Build a timecode from already-split fields, applying the same
    /// validation as [`Timecode::parse`].
    ///
    /// # Errors
    /// Returns [`TimecodeError`] on out-of-range or dropped values.
    pub fn from_fields(
        hours: u32,
        minutes: u32,
        seconds: u32,
        frames: u32,
        rate: Framerate,
    ) -> Result<Self, TimecodeError> {
        if hours > 23 {
            return Err(TimecodeError::FieldOutOfRange {
                field: "HH",
                value: hours,
            });
        }
        if minutes > 59 {
            return Err(TimecodeError::FieldOutOfRange {
                field: "MM",
                value: minutes,
            });
        }
        if seconds > 59 {
            return Err(TimecodeError::FieldOutOfRange {
                field: "SS",
                value: seconds,
            });
        }
        if frames >= rate.timebase() {
            return Err(TimecodeError::FieldOutOfRange {
                field: "FF",
                value: frames,
            });
        }

        let dropped = rate.dropped_per_minute();
        if dropped > 0 && seconds == 0 && minutes % 10 != 0 && frames < dropped {
            return Err(TimecodeError::DroppedFrame {
                text: format!("{hours:02}:{minutes:02}:{seconds:02}:{frames:02}"),
            });
        }

        let timebase = u64::from(rate.timebase());
        let total_minutes = u64::from(hours) * 60 + u64::from(minutes);
        let nondrop = (total_minutes * 60 + u64::from(seconds)) * timebase + u64::from(frames);
        let frame = nondrop - u64::from(dropped) * (total_minutes - total_minutes / 10);

        Ok(Self { frame, rate })
    }

    /// The canonical frame number, in `0..frames_per_day`.
    #[must_use]
    pub fn frame_number(&self) -> u64 {
        self.frame
    }

    /// The framerate this timecode is counted under.
    #[must_use]
    pub fn rate(&self) -> Framerate {
        self.rate
    }

    /// Advance by `delta` frames, wrapping at 24 hours.
    #[must_use]
    pub fn advance(&self, delta: u64) -> Self {
        let total = self.rate.frames_per_day();
        Self {
            frame: (self.frame + delta % total) % total,
            rate: self.rate,
        }
    }

    /// The `(HH, MM, SS, FF)` display fields.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, reason = "fields are bounded by 24/60/timebase")]
    pub fn fields(&self) -> (u32, u32, u32, u32) {
        let timebase = u64::from(self.rate.timebase());
        let dropped = u64::from(self.rate.dropped_per_minute());

        // Reinsert the dropped labels so the split by timebase lines up.
        let nondrop = if dropped == 0 {
            self.frame
        } else {
            let per_ten_minutes = 600 * timebase - 9 * dropped;
            let per_minute = 60 * timebase - dropped;
            let tens = self.frame / per_ten_minutes;
            let rem = self.frame % per_ten_minutes;
            // The first minute of each block keeps all its labels.
            let extra_minutes = if rem < 60 * timebase {
                0
            } else {
                (rem - 60 * timebase) / per_minute + 1
            };
            self.frame + dropped * (9 * tens + extra_minutes)
        };

        let frames = nondrop % timebase;
        let total_seconds = nondrop / timebase;
        (
            (total_seconds / 3600) as u32,
            (total_seconds / 60 % 60) as u32,
            (total_seconds % 60) as u32,
            frames as u32,
        )
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (hh, mm, ss, ff) = self.fields();
        write!(f, "{hh:02}:{mm:02}:{ss:02}:{ff:02}")
    }
}
