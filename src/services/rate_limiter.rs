use std::time::{Duration, Instant};
use tokio::sync::Mutex as TokioMutex;
use tokio::time::sleep;

/// Shared pacing limiter for upstream requests across all concurrent tasks.
///
/// Sliding-window accounting: a request may proceed when fewer than
/// `limit_per_minute` requests were admitted in the trailing 60 seconds.
#[derive(Debug)]
pub struct SharedRateLimiter {
    /// Timestamps of recently admitted requests (sliding window).
    admitted: TokioMutex<Vec<Instant>>,
    limit_per_minute: u32,
}

const WINDOW: Duration = Duration::from_secs(60);

impl SharedRateLimiter {
    pub fn new(limit_per_minute: u32) -> Self {
        Self {
            admitted: TokioMutex::new(Vec::new()),
            limit_per_minute: limit_per_minute.max(1),
        }
    }

    /// Time until the next slot opens, or `None` when one is free now.
    /// Does not admit.
    async fn wait_needed(&self) -> Option<Duration> {
        let now = Instant::now();
        let mut admitted = self.admitted.lock().await;
        admitted.retain(|&at| now.duration_since(at) < WINDOW);

        if admitted.len() < self.limit_per_minute as usize {
            admitted.push(now);
            return None;
        }
        let oldest = *admitted.first().expect("window is at capacity");
        Some(WINDOW - now.duration_since(oldest) + Duration::from_millis(50))
    }

    /// Wait until the pacing window admits this request.
    pub async fn acquire(&self) {
        loop {
            match self.wait_needed().await {
                None => return,
                // Lock is released before sleeping so other tasks can check.
                Some(wait) => sleep(wait).await,
            }
        }
    }

    /// Deadline-aware acquire: gives up with `false` when the window cannot
    /// admit the request before `deadline`.
    pub async fn acquire_until(&self, deadline: Instant) -> bool {
        loop {
            match self.wait_needed().await {
                None => return true,
                Some(wait) => {
                    if Instant::now() + wait > deadline {
                        return false;
                    }
                    sleep(wait).await;
                }
            }
        }
    }

    /// Requests admitted inside the current window (for /health).
    pub async fn in_window(&self) -> usize {
        let now = Instant::now();
        let mut admitted = self.admitted.lock().await;
        admitted.retain(|&at| now.duration_since(at) < WINDOW);
        admitted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_up_to_limit_without_waiting() {
        let limiter = SharedRateLimiter::new(3);
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(limiter.in_window().await, 3);
    }

    #[tokio::test]
    async fn deadline_aware_acquire_gives_up() {
        let limiter = SharedRateLimiter::new(1);
        limiter.acquire().await;
        // The window is full for ~60s; a 50ms deadline cannot be met.
        let ok = limiter
            .acquire_until(Instant::now() + Duration::from_millis(50))
            .await;
        assert!(!ok);
    }
}
