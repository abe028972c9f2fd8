//! Discrete time sources shared by the upload pipeline and the voting countdown.
//!
//! The state machines never read a clock themselves. They are advanced by
//! whoever owns a [`TickSource`], either a wall clock or a test stepper.

use log::debug;

use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

/// A source of discrete ticks.
pub trait TickSource {
    /// Returns the number of whole ticks elapsed since the previous call.
    ///
    /// A late caller may receive several ticks at once (coalesced ticks).
    /// `None` means the source is exhausted and will not tick again.
    fn poll(&mut self) -> Option<u32>;
}

/// Anything driven by ticks.
pub trait Tickable {
    fn tick(&mut self);

    /// Applies `n` coalesced ticks. The default replays them one by one.
    fn tick_by(&mut self, n: u32) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// True when no automatic transition is pending any more.
    fn is_settled(&self) -> bool;
}

/// A tick source fully controlled by the caller, mostly for tests.
#[derive(Debug, Clone, Default)]
pub struct ManualTicks {
    batches: VecDeque<u32>,
}

impl ManualTicks {
    pub fn new() -> ManualTicks {
        ManualTicks::default()
    }

    /// A source delivering `n` single ticks.
    pub fn steps(n: u32) -> ManualTicks {
        ManualTicks {
            batches: std::iter::repeat(1).take(n as usize).collect(),
        }
    }

    /// Queues one poll result carrying `ticks` coalesced ticks.
    pub fn push(&mut self, ticks: u32) -> &mut ManualTicks {
        self.batches.push_back(ticks);
        self
    }

    pub fn remaining_batches(&self) -> usize {
        self.batches.len()
    }
}

impl TickSource for ManualTicks {
    fn poll(&mut self) -> Option<u32> {
        self.batches.pop_front()
    }
}

/// A wall-clock tick source with a fixed interval.
///
/// `poll` blocks until at least one interval has elapsed since the last
/// delivered tick. Time lost by a slow caller is reported as coalesced ticks
/// rather than dropped.
#[derive(Debug, Clone)]
pub struct IntervalTicks {
    interval: Duration,
    last: Instant,
    limit: Option<u64>,
    delivered: u64,
}

impl IntervalTicks {
    pub fn new(interval: Duration) -> IntervalTicks {
        let interval = if interval.is_zero() {
            Duration::from_millis(1)
        } else {
            interval
        };
        IntervalTicks {
            interval,
            last: Instant::now(),
            limit: None,
            delivered: 0,
        }
    }

    pub fn from_millis(millis: u64) -> IntervalTicks {
        IntervalTicks::new(Duration::from_millis(millis))
    }

    /// Stops the source after `limit` ticks in total.
    pub fn with_limit(self, limit: u64) -> IntervalTicks {
        IntervalTicks {
            limit: Some(limit),
            ..self
        }
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

impl TickSource for IntervalTicks {
    fn poll(&mut self) -> Option<u32> {
        let budget = match self.limit {
            Some(l) if self.delivered >= l => return None,
            Some(l) => l - self.delivered,
            None => u64::MAX,
        };
        let mut elapsed = self.last.elapsed();
        while elapsed < self.interval {
            thread::sleep(self.interval - elapsed);
            elapsed = self.last.elapsed();
        }
        let whole = (elapsed.as_nanos() / self.interval.as_nanos()) as u64;
        let n = whole.min(budget).min(u32::MAX as u64);
        // Only consume the time corresponding to the ticks handed out.
        self.last += self.interval * (n as u32);
        self.delivered += n;
        if n > 1 {
            debug!("IntervalTicks: coalesced {} ticks", n);
        }
        Some(n as u32)
    }
}

/// Feeds ticks from `source` into `target` until the target is settled,
/// the source runs dry or `max_ticks` ticks have been delivered.
///
/// Returns the number of ticks actually delivered.
pub fn drive<S, T>(source: &mut S, target: &mut T, max_ticks: u64) -> u64
where
    S: TickSource + ?Sized,
    T: Tickable + ?Sized,
{
    let mut delivered: u64 = 0;
    while delivered < max_ticks && !target.is_settled() {
        let n = match source.poll() {
            Some(n) => n as u64,
            None => break,
        };
        let n = n.min(max_ticks - delivered);
        if n == 0 {
            continue;
        }
        target.tick_by(n as u32);
        delivered += n;
    }
    debug!("drive: delivered {} ticks", delivered);
    delivered
}
