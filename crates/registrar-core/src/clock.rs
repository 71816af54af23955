use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Ordering key of a waitlist request.
///
/// Ordering is wall_ms -> seq. Two requests in the same millisecond are
/// ordered by the sequence the clock issued them in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct RequestStamp {
    /// Milliseconds since Unix epoch.
    pub wall_ms: u64,
    /// Counter for requests issued within the same wall_ms.
    pub seq: u32,
}

impl RequestStamp {
    pub fn new(wall_ms: u64, seq: u32) -> Self {
        Self { wall_ms, seq }
    }
}

/// Issues strictly increasing request stamps, even if the system clock
/// steps backwards.
pub struct RequestClock {
    last: Mutex<RequestStamp>,
}

impl RequestClock {
    pub fn new() -> Self {
        Self::resume_from(RequestStamp::default())
    }

    /// Create a clock whose next stamp is after `last`, e.g. the newest stamp
    /// found in a persisted waitlist.
    pub fn resume_from(last: RequestStamp) -> Self {
        Self {
            last: Mutex::new(last),
        }
    }

    /// Generate a new stamp.
    pub fn now(&self) -> RequestStamp {
        let mut last = self.last.lock();
        let physical = system_time_millis();

        let next = if physical > last.wall_ms {
            RequestStamp::new(physical, 0)
        } else if last.seq == u32::MAX {
            RequestStamp::new(last.wall_ms + 1, 0)
        } else {
            RequestStamp::new(last.wall_ms, last.seq + 1)
        };

        *last = next;
        next
    }
}

impl Default for RequestClock {
    fn default() -> Self {
        Self::new()
    }
}

fn system_time_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
