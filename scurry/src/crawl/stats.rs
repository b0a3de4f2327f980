use serde::Serialize;

/// Per-worker processing counters.
#[derive(Clone, Debug, Serialize)]
pub struct WorkerStats {
    pub total_execution_time: std::time::Duration,
    pub pages_processed: usize,
    pub pages_succeeded: usize,
    pub pages_failed: usize,
}

impl Default for WorkerStats {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerStats {
    pub fn new() -> Self {
        Self {
            total_execution_time: std::time::Duration::new(0, 0),
            pages_processed: 0,
            pages_succeeded: 0,
            pages_failed: 0,
        }
    }

    pub fn record_execution_time(&mut self, duration: std::time::Duration) {
        self.total_execution_time += duration;
        self.pages_processed += 1;
    }

    pub fn record_success(&mut self) {
        self.pages_succeeded += 1;
    }

    pub fn record_failure(&mut self) {
        self.pages_failed += 1;
    }

    pub fn average_execution_time(&self) -> std::time::Duration {
        if self.pages_processed == 0 {
            return std::time::Duration::new(0, 0);
        }
        self.total_execution_time / self.pages_processed as u32
    }
}
