//! Supported broadcast framerates
//!
//! Each framerate is identified by a stable string key used on the wire.
//! The `nominal_fps` value exists for display only and is never compared;
//! all timing math uses the exact rational frame duration.

use std::time::Duration;

/// Seconds in a 24-hour day.
const SECONDS_PER_DAY: u64 = 86_400;

/// Minutes per day that drop frames (all minutes except the tenth ones).
const DROP_MINUTES_PER_DAY: u64 = 54 * 24;

/// A broadcast framerate descriptor.
///
/// Lookup via [`Framerate::from_key`]; the set of keys is closed.
#[derive(Debug, Clone, Copy)]
pub struct Framerate {
    key: &'static str,
    nominal_fps: f64,
    timebase: u32,
    drop_frame: bool,
    /// Exact frame duration in seconds, as `interval_num / interval_den`.
    interval_num: u32,
    interval_den: u32,
}

/// The closed table of supported framerates.
static SUPPORTED: [Framerate; 7] = [
    Framerate {
        key: "23.976",
        nominal_fps: 23.976,
        timebase: 24,
        drop_frame: false,
        interval_num: 1001,
        interval_den: 24_000,
    },
    Framerate {
        key: "24",
        nominal_fps: 24.0,
        timebase: 24,
        drop_frame: false,
        interval_num: 1,
        interval_den: 24,
    },
    Framerate {
        key: "29.97",
        nominal_fps: 29.97,
        timebase: 30,
        drop_frame: true,
        interval_num: 1001,
        interval_den: 30_000,
    },
    Framerate {
        key: "30",
        nominal_fps: 30.0,
        timebase: 30,
        drop_frame: false,
        interval_num: 1,
        interval_den: 30,
    },
    Framerate {
        key: "50",
        nominal_fps: 50.0,
        timebase: 50,
        drop_frame: false,
        interval_num: 1,
        interval_den: 50,
    },
    Framerate {
        key: "59.94",
        nominal_fps: 59.94,
        timebase: 60,
        drop_frame: true,
        interval_num: 1001,
        interval_den: 60_000,
    },
    Framerate {
        key: "60",
        nominal_fps: 60.0,
        timebase: 60,
        drop_frame: false,
        interval_num: 1,
        interval_den: 60,
    },
];

impl Framerate {
    /// Look up a framerate by its wire key.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Framerate> {
        SUPPORTED.iter().find(|f| f.key == key).copied()
    }

    /// All supported wire keys, in table order.
    #[must_use]
    pub fn supported_keys() -> Vec<&'static str> {
        SUPPORTED.iter().map(|f| f.key).collect()
    }

    /// The stable wire identifier.
    #[must_use]
    pub fn key(&self) -> &'static str {
        self.key
    }

    /// Nominal frames per second (display only).
    #[must_use]
    pub fn nominal_fps(&self) -> f64 {
        self.nominal_fps
    }

    /// Integer frames per second used when formatting; the `FF` field
    /// ranges over `0..timebase`.
    #[must_use]
    pub fn timebase(&self) -> u32 {
        self.timebase
    }

    /// True for the drop-frame rates (29.97 and 59.94).
    #[must_use]
    pub fn is_drop_frame(&self) -> bool {
        self.drop_frame
    }

    /// Labels dropped at the start of each non-tenth minute (0 when
    /// non-drop): 2 for 29.97, 4 for 59.94.
    #[must_use]
    pub fn dropped_per_minute(&self) -> u32 {
        if self.drop_frame { self.timebase / 15 } else { 0 }
    }

    /// Distinct timecode labels in a 24-hour day; frame numbers wrap
    /// modulo this total.
    #[must_use]
    pub fn frames_per_day(&self) -> u64 {
        u64::from(self.timebase) * SECONDS_PER_DAY
            - u64::from(self.dropped_per_minute()) * DROP_MINUTES_PER_DAY
    }

    /// Wall-clock duration covered by `frames` frames, exact to the
    /// nanosecond. Successive targets computed from a fixed epoch do not
    /// accumulate rounding error.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, reason = "fits u64 for any 24h span")]
    pub fn duration_for(&self, frames: u64) -> Duration {
        let nanos = u128::from(frames) * u128::from(self.interval_num) * 1_000_000_000
            / u128::from(self.interval_den);
        Duration::from_nanos(nanos as u64)
    }

    /// Duration of a single frame period.
    #[must_use]
    pub fn frame_duration(&self) -> Duration {
        self.duration_for(1)
    }

    /// Whole frame periods elapsed in `span`: the largest `k` with
    /// `duration_for(k) <= span`.
    ///
    /// Exact inverse of [`duration_for`](Framerate::duration_for), so
    /// `frames_elapsed(duration_for(k)) == k` for every `k`. Deriving the
    /// count by re-dividing the truncated nanosecond value would round
    /// down by one frame whenever `span` lands exactly on a scheduled
    /// target.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, reason = "fits u64 for any 24h span")]
    pub fn frames_elapsed(&self, span: Duration) -> u64 {
        // duration_for(k) <= span  <=>  k * num * 1e9 < (span + 1) * den
        let frame_nanos = u128::from(self.interval_num) * 1_000_000_000;
        let frames =
            ((span.as_nanos() + 1) * u128::from(self.interval_den) - 1) / frame_nanos;
        frames as u64
    }
}

impl PartialEq for Framerate {
    fn eq(&self, other: &Self) -> bool {
        // The key identifies the rate; nominal_fps is never compared.
        self.key == other.key
    }
}

impl Eq for Framerate {}
