use std::time::Duration;

use rand::Rng;

/// Exponential backoff with jitter for consecutive transport failures: base, doubling,
/// capped, then jittered by `(1 ± jitter)` and floored so a jittered delay never drops
/// below `floor_ms` even when jitter would pull it under.
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
    jitter: f64,
    floor_ms: u64,
    consecutive: u32,
}

impl Backoff {
    pub fn new(base_ms: u64, max_ms: u64, jitter: f64, floor_ms: u64) -> Self {
        Self {
            base_ms,
            max_ms,
            jitter,
            floor_ms,
            consecutive: 0,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let exp = self.base_ms.saturating_mul(1u64 << self.consecutive.min(20));
        let capped = exp.min(self.max_ms);
        self.consecutive = self.consecutive.saturating_add(1);
        jittered(capped, self.jitter, self.floor_ms)
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }
}

/// Applies `(1 ± jitter)` to `base_ms` and floors the result at `floor_ms`.
pub fn jittered(base_ms: u64, jitter: f64, floor_ms: u64) -> Duration {
    let factor = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);
    let delay_ms = ((base_ms as f64) * factor).max(0.0) as u64;
    Duration::from_millis(delay_ms.max(floor_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let mut b = Backoff::new(1000, 8000, 0.0, 100);
        assert_eq!(b.next_delay(), Duration::from_millis(1000));
        assert_eq!(b.next_delay(), Duration::from_millis(2000));
        assert_eq!(b.next_delay(), Duration::from_millis(4000));
        assert_eq!(b.next_delay(), Duration::from_millis(8000));
        assert_eq!(b.next_delay(), Duration::from_millis(8000), "capped at max_ms");
    }

    #[test]
    fn reset_returns_to_base() {
        let mut b = Backoff::new(1000, 8000, 0.0, 100);
        b.next_delay();
        b.next_delay();
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_millis(1000));
    }

    #[test]
    fn jittered_never_drops_below_floor() {
        for _ in 0..1000 {
            let d = jittered(100, 0.99, 50);
            assert!(d.as_millis() >= 50);
        }
    }
}
