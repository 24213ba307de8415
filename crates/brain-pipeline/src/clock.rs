//! Time source shared by the pipeline and its sweeps.
//!
//! Every timestamp the brain writes (stage entry, history, escalation,
//! status) and every dwell comparison the sweeps make reads the same
//! clock, so a replay that advances time moves all of them together.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::error::{PipelineError, PipelineResult};

pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// Start at the current wall-clock time.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Move forward by `secs` and return the new time.
    ///
    /// Negative steps and steps past the representable range are
    /// `InvalidInput`; the clock is left where it was.
    pub fn advance(&self, secs: i64) -> PipelineResult<DateTime<Utc>> {
        if secs < 0 {
            return Err(PipelineError::InvalidInput(format!(
                "cannot move the clock back by {}s",
                -(secs as i128)
            )));
        }
        let step = Duration::try_seconds(secs).ok_or_else(|| {
            PipelineError::InvalidInput(format!("clock step of {}s is out of range", secs))
        })?;

        let mut current = self.current.lock();
        let next = current.checked_add_signed(step).ok_or_else(|| {
            PipelineError::InvalidInput(format!(
                "advancing {} by {}s leaves the calendar range",
                *current, secs
            ))
        })?;
        *current = next;
        Ok(next)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock()
    }
}
