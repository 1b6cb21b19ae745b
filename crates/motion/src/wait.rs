use std::{thread, time::Duration};

/// Sleep for `total` in slices of at most `interval`, checking `stop` before
/// each slice. Returns `true` when the wait ended early.
pub fn wait_interruptible<F>(total: Duration, interval: Duration, mut stop: F) -> bool
where
    F: FnMut() -> bool,
{
    let interval = interval.max(Duration::from_millis(1));
    let mut waited = Duration::ZERO;
    while waited < total {
        if stop() {
            return true;
        }
        let slice = interval.min(total - waited);
        thread::sleep(slice);
        waited += slice;
    }
    false
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn completes_full_wait_when_not_stopped() {
        let start = Instant::now();
        let early = wait_interruptible(Duration::from_millis(30), Duration::from_millis(10), || false);
        assert!(!early);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn returns_early_on_stop() {
        let mut checks = 0;
        let start = Instant::now();
        let early = wait_interruptible(Duration::from_secs(10), Duration::from_millis(5), || {
            checks += 1;
            checks > 2
        });
        assert!(early);
        assert_eq!(checks, 3);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn zero_total_never_checks() {
        let mut checked = false;
        assert!(!wait_interruptible(Duration::ZERO, Duration::from_millis(5), || {
            checked = true;
            true
        }));
        assert!(!checked);
    }
}
