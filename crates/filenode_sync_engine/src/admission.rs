//! Run admission: the cooldown window and the single-run guard.

use crate::error::{SyncError, SyncResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Start time of the last admitted run, checked and updated atomically.
///
/// Stored as milliseconds since `epoch` plus one; zero means no run has been
/// admitted yet.
#[derive(Debug)]
pub(crate) struct Cooldown {
    epoch: Instant,
    window: Duration,
    last_start: AtomicU64,
}

/// A successful cooldown claim that can still be rolled back.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Claim {
    previous: u64,
    stamp: u64,
}

impl Cooldown {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            epoch: Instant::now(),
            window,
            last_start: AtomicU64::new(0),
        }
    }

    /// Time left before a run may be admitted at `now`, if any.
    pub(crate) fn remaining(&self, now: Instant) -> Option<Duration> {
        self.remaining_after(self.last_start.load(Ordering::Acquire), now)
    }

    fn remaining_after(&self, stamp: u64, now: Instant) -> Option<Duration> {
        if stamp == 0 {
            return None;
        }
        let started = self.epoch + Duration::from_millis(stamp - 1);
        let elapsed = now.saturating_duration_since(started);
        (elapsed < self.window).then(|| self.window - elapsed)
    }

    /// Records `now` as the start of a run unless the window is still open.
    ///
    /// Of several concurrent callers inside one window exactly one succeeds.
    pub(crate) fn try_claim(&self, now: Instant) -> Result<Claim, Duration> {
        let stamp = now.saturating_duration_since(self.epoch).as_millis() as u64 + 1;
        let mut previous = self.last_start.load(Ordering::Acquire);
        loop {
            if let Some(left) = self.remaining_after(previous, now) {
                return Err(left);
            }
            match self.last_start.compare_exchange(
                previous,
                stamp,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(Claim { previous, stamp }),
                Err(current) => previous = current,
            }
        }
    }

    /// Undoes `claim` if no later claim replaced it.
    pub(crate) fn release(&self, claim: Claim) {
        let _ = self.last_start.compare_exchange(
            claim.stamp,
            claim.previous,
            Ordering::AcqRel,
            Ordering::Relaxed,
        );
    }
}

/// Permission to execute one sync run.
///
/// Holding an admission marks the engine busy; dropping it, normally at the
/// end of the run, frees the engine for the next one.
#[derive(Debug)]
pub struct Admission {
    run_id: Uuid,
    admitted_at: Instant,
    running: Arc<AtomicBool>,
}

impl Admission {
    /// Identifier of the admitted run, attached to all of its log events.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// When the run was admitted.
    pub fn admitted_at(&self) -> Instant {
        self.admitted_at
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Admission control shared by every trigger of an engine.
#[derive(Debug)]
pub(crate) struct Gate {
    cooldown: Cooldown,
    running: Arc<AtomicBool>,
}

impl Gate {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            cooldown: Cooldown::new(window),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Admits a run, or rejects it with `TooFrequent` or `Busy`.
    pub(crate) fn admit(&self) -> SyncResult<Admission> {
        let now = Instant::now();
        let claim = self
            .cooldown
            .try_claim(now)
            .map_err(|retry_after| SyncError::TooFrequent { retry_after })?;

        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.cooldown.release(claim);
            return Err(SyncError::Busy);
        }

        Ok(Admission {
            run_id: Uuid::new_v4(),
            admitted_at: now,
            running: Arc::clone(&self.running),
        })
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn cooldown_remaining(&self) -> Option<Duration> {
        self.cooldown.remaining(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_claim_always_succeeds() {
        let cooldown = Cooldown::new(Duration::from_secs(300));
        assert!(cooldown.try_claim(Instant::now()).is_ok());
    }

    #[test]
    fn second_claim_inside_window_is_rejected() {
        let cooldown = Cooldown::new(Duration::from_secs(300));
        let now = Instant::now();
        cooldown.try_claim(now).unwrap();

        let left = cooldown
            .try_claim(now + Duration::from_secs(100))
            .unwrap_err();
        assert!(left <= Duration::from_secs(200));
        assert!(left > Duration::from_secs(199));

        assert!(cooldown.try_claim(now + Duration::from_secs(301)).is_ok());
    }

    #[test]
    fn zero_window_never_rejects() {
        let cooldown = Cooldown::new(Duration::ZERO);
        let now = Instant::now();
        assert!(cooldown.try_claim(now).is_ok());
        assert!(cooldown.try_claim(now).is_ok());
        assert!(cooldown.remaining(now).is_none());
    }

    #[test]
    fn release_restores_previous_start() {
        let cooldown = Cooldown::new(Duration::from_secs(60));
        let claim = cooldown.try_claim(Instant::now()).unwrap();
        cooldown.release(claim);
        assert!(cooldown.remaining(Instant::now()).is_none());
    }

    #[test]
    fn concurrent_claims_admit_exactly_one() {
        let cooldown = Arc::new(Cooldown::new(Duration::from_secs(60)));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cooldown = Arc::clone(&cooldown);
                std::thread::spawn(move || cooldown.try_claim(Instant::now()).is_ok())
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 1);
    }

    #[test]
    fn busy_gate_keeps_cooldown_untouched() {
        let gate = Gate::new(Duration::ZERO);
        let first = gate.admit().unwrap();
        assert!(gate.is_running());
        assert!(matches!(gate.admit(), Err(SyncError::Busy)));

        drop(first);
        assert!(!gate.is_running());
        assert!(gate.admit().is_ok());
    }

    #[test]
    fn cooldown_is_checked_before_busy() {
        let gate = Gate::new(Duration::from_secs(60));
        let _running = gate.admit().unwrap();
        assert!(matches!(gate.admit(), Err(SyncError::TooFrequent { .. })));
    }
}
