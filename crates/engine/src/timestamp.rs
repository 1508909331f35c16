//! Wall-clock timestamps as floating point seconds since the Unix epoch,
//! the representation persisted in checkpoints and change logs.

use std::time::SystemTime;
use time::OffsetDateTime;

pub fn now() -> f64 {
    epoch_seconds(OffsetDateTime::now_utc())
}

pub fn epoch_seconds(at: OffsetDateTime) -> f64 {
    at.unix_timestamp_nanos() as f64 / 1_000_000_000.0
}

pub fn from_system_time(at: SystemTime) -> f64 {
    epoch_seconds(OffsetDateTime::from(at))
}
