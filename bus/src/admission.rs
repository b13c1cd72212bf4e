use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitDecision {
    Admit,
    RejectSoft,
    RejectHard,
}

/// Inflight counter plus overload latch with hysteresis, built from plain atomics
/// rather than a mutex so admission checks never block on contention.
pub struct AdmissionController {
    inflight: AtomicI64,
    overload: AtomicBool,
    soft: i64,
    hard: i64,
    hysteresis: f64,
}

impl AdmissionController {
    pub fn new(soft: i64, hard: i64, hysteresis: f64) -> Self {
        Self {
            inflight: AtomicI64::new(0),
            overload: AtomicBool::new(false),
            soft,
            hard,
            hysteresis,
        }
    }

    pub fn try_admit(&self) -> AdmitDecision {
        if self.inflight.load(Ordering::SeqCst) >= self.hard {
            return AdmitDecision::RejectHard;
        }
        if self.overload.load(Ordering::SeqCst) {
            return AdmitDecision::RejectSoft;
        }
        let current = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
        if current >= self.soft {
            self.overload.store(true, Ordering::SeqCst);
        }
        AdmitDecision::Admit
    }

    pub fn release(&self) {
        let remaining = self.inflight.fetch_sub(1, Ordering::SeqCst) - 1;
        let clear_threshold = (self.soft as f64 * self.hysteresis) as i64;
        if remaining < clear_threshold {
            self.overload.store(false, Ordering::SeqCst);
        }
    }

    pub fn inflight(&self) -> i64 {
        self.inflight.load(Ordering::Relaxed)
    }

    pub fn is_overloaded(&self) -> bool {
        self.overload.load(Ordering::Relaxed)
    }
}
