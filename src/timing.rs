//! Time predicates over explicitly injected timestamps (unix seconds).
//!
//! Nothing in the crate reads a wall clock; every operation that depends on time
//! receives `now` from its caller.

/// `true` while `now` is no more than `window` seconds after `stored`.
///
/// A `now` earlier than `stored` counts as inside the window.
pub fn within_window(stored: u64, now: u64, window: u64) -> bool {
    now.saturating_sub(stored) <= window
}

/// `true` once at least `delay` seconds have passed since `stored`.
pub fn delay_elapsed(stored: u64, now: u64, delay: u64) -> bool {
    match stored.checked_add(delay) {
        Some(ready_at) => now >= ready_at,
        None => false,
    }
}

/// Earliest time at which [`delay_elapsed`] becomes `true`.
pub fn ready_at(stored: u64, delay: u64) -> u64 {
    stored.saturating_add(delay)
}
