//! `RND` support: a small self-seeded generator.
//!
//! No repo in the reference pack pulls in the `rand` crate, so rather than
//! add a dependency with no corpus precedent, this follows
//! `devices::Timer`'s own pattern of seeding state from `Instant`/`SystemTime`
//! and advancing it with plain integer arithmetic — a xorshift64* generator
//! instead of a centisecond counter.

use std::cell::Cell;
use std::time::{SystemTime, UNIX_EPOCH};

thread_local! {
    static STATE: Cell<u64> = Cell::new(seed_from_clock());
    static LAST: Cell<f64> = Cell::new(0.0);
}

fn seed_from_clock() -> u64 {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0x9E3779B97F4A7C15);
    nanos ^ 0x2545_F491_4F6C_DD1D
}

fn xorshift64star(state: u64) -> u64 {
    let mut x = state;
    x ^= x >> 12;
    x ^= x << 25;
    x ^= x >> 27;
    x.wrapping_mul(0x2545_F491_4F6C_DD1D)
}

/// `RND`/`RND(1)`: advances the generator and returns a value in `[0, 1)`.
pub fn next_f64() -> f64 {
    let value = STATE.with(|s| {
        let next = xorshift64star(s.get());
        s.set(next);
        next
    });
    let out = (value >> 11) as f64 / (1u64 << 53) as f64;
    LAST.with(|l| l.set(out));
    out
}

/// `RND(0)`: repeats the last value returned by [`next_f64`] without
/// advancing the generator.
pub fn last_f64() -> f64 {
    LAST.with(|l| l.get())
}

/// `RND(-n)`: reseeds deterministically from `n`, matching the dialect's
/// repeatable-sequence convention.
pub fn reseed(seed: u64) {
    STATE.with(|s| s.set(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reseed_gives_repeatable_sequence() {
        reseed(42);
        let a = next_f64();
        reseed(42);
        let b = next_f64();
        assert_eq!(a, b);
    }

    #[test]
    fn values_stay_in_unit_range() {
        reseed(7);
        for _ in 0..100 {
            let v = next_f64();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn last_repeats_without_advancing() {
        reseed(3);
        let a = next_f64();
        let b = last_f64();
        assert_eq!(a, b);
        let c = last_f64();
        assert_eq!(b, c);
    }
}
