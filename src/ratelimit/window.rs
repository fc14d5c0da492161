//! Fixed (reset-on-expiry) counting window

/// Counter for one fixed window.
///
/// The window is live while `now - window_start <= size`. Consuming from an
/// expired window restarts it at `now` with a count of 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindow {
    count: u32,
    window_start_ms: i64,
}

impl FixedWindow {
    /// Empty window anchored at `now_ms`
    pub fn new(now_ms: i64) -> Self {
        Self {
            count: 0,
            window_start_ms: now_ms,
        }
    }

    fn is_expired(&self, now_ms: i64, size_ms: i64) -> bool {
        now_ms - self.window_start_ms > size_ms
    }

    /// Count as seen at `now_ms` (0 once the window has expired)
    pub fn current(&self, now_ms: i64, size_ms: i64) -> u32 {
        if self.is_expired(now_ms, size_ms) {
            0
        } else {
            self.count
        }
    }

    /// Record one send
    pub fn consume(&mut self, now_ms: i64, size_ms: i64) {
        if self.is_expired(now_ms, size_ms) {
            self.count = 1;
            self.window_start_ms = now_ms;
        } else {
            self.count += 1;
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn window_start_ms(&self) -> i64 {
        self.window_start_ms
    }
}
