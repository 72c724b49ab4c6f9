//! Timer tick counter, advanced by the dispatcher on every IRQ 0.

use core::sync::atomic::{AtomicU64, Ordering};

pub use crate::config::TICK_NUM;

#[derive(Debug, Default)]
pub struct Ticks(AtomicU64);

impl Ticks {
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Bumps the counter and returns the new value.
    pub fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// True once every `TICK_NUM` ticks.
    pub fn is_heartbeat(ticks: u64) -> bool {
        ticks % TICK_NUM == 0
    }
}
