//! Admission Rate Limiter (Token Bucket)
//!
//! Bounds how fast mutating RPC calls reach the engine. Lock-free: the
//! bucket state lives in a single atomic word.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

const MILLI: u64 = 1000;

/// Token bucket with millitoken precision
pub struct RateLimiter {
    // Upper 32 bits: available millitokens
    // Lower 32 bits: last refill, ms since `created` (wrapping)
    packed: AtomicU64,
    created: Instant,
    max_tokens: u32,
    refill_rate: u32, // tokens per second
}

fn pack(millitokens: u64, at_ms: u32) -> u64 {
    (millitokens << 32) | at_ms as u64
}

fn unpack(packed: u64) -> (u64, u32) {
    (packed >> 32, (packed & 0xFFFF_FFFF) as u32)
}

impl RateLimiter {
    /// `max_tokens` is the burst size, `refill_rate` the sustained rate.
    ///
    /// `RateLimiter::new(500, 250)` admits a burst of 500 calls, then 250/s.
    pub fn new(max_tokens: u32, refill_rate: u32) -> Self {
        // Millitokens must fit the upper half
        let max_tokens = max_tokens.min(u32::MAX / MILLI as u32);
        Self {
            packed: AtomicU64::new(pack(max_tokens as u64 * MILLI, 0)),
            created: Instant::now(),
            max_tokens,
            refill_rate,
        }
    }

    fn elapsed_ms(&self) -> u32 {
        // Wraps after ~49 days; deltas stay correct through wrapping_sub
        self.created.elapsed().as_millis() as u32
    }

    /// Consume one token. `false` when the bucket is empty.
    pub fn try_acquire(&self) -> bool {
        let capacity = self.max_tokens as u64 * MILLI;
        loop {
            let current = self.packed.load(Ordering::Acquire);
            let (millitokens, last_ms) = unpack(current);

            let now_ms = self.elapsed_ms();
            let delta_ms = now_ms.wrapping_sub(last_ms) as u64;
            let refilled = (millitokens + delta_ms * self.refill_rate as u64).min(capacity);

            let (next, admitted) = if refilled >= MILLI {
                (refilled - MILLI, true)
            } else {
                (refilled, false)
            };

            if self
                .packed
                .compare_exchange(
                    current,
                    pack(next, now_ms),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return admitted;
            }
        }
    }

    /// Whole tokens currently available (monitoring only)
    pub fn available(&self) -> u32 {
        let (millitokens, _) = unpack(self.packed.load(Ordering::Acquire));
        (millitokens / MILLI) as u32
    }
}
