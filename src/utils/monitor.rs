#[cfg(feature = "cli")]
use std::sync::Mutex;
use std::time::{Duration, Instant};
#[cfg(feature = "cli")]
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

#[derive(Debug, Clone)]
pub struct StageStats {
    pub stage: String,
    pub cpu_usage: f32,
    pub memory_usage_mb: u64,
    pub peak_memory_mb: u64,
    pub elapsed: Duration,
}

/// Samples process CPU and memory between pipeline stages.
///
/// Disabled monitors (and builds without the `cli` feature) only track time.
pub struct StageMonitor {
    #[cfg(feature = "cli")]
    system: Mutex<System>,
    #[cfg(feature = "cli")]
    pid: Option<Pid>,
    #[cfg(feature = "cli")]
    peak_memory_mb: Mutex<u64>,
    start_time: Instant,
    enabled: bool,
}

impl StageMonitor {
    pub fn new(enabled: bool) -> Self {
        #[cfg(feature = "cli")]
        {
            let pid = sysinfo::get_current_pid().ok();
            if enabled && pid.is_none() {
                tracing::warn!("Could not determine current PID, resource stats disabled");
            }
            Self {
                system: Mutex::new(System::new()),
                pid,
                peak_memory_mb: Mutex::new(0),
                start_time: Instant::now(),
                enabled,
            }
        }
        #[cfg(not(feature = "cli"))]
        {
            Self {
                start_time: Instant::now(),
                enabled,
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    #[cfg(feature = "cli")]
    pub fn sample(&self, stage: &str) -> Option<StageStats> {
        if !self.enabled {
            return None;
        }
        let pid = self.pid?;
        let mut system = self.system.lock().ok()?;
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );
        let process = system.process(pid)?;
        let memory_mb = process.memory() / 1024 / 1024;

        let mut peak = self.peak_memory_mb.lock().ok()?;
        *peak = (*peak).max(memory_mb);

        Some(StageStats {
            stage: stage.to_string(),
            cpu_usage: process.cpu_usage(),
            memory_usage_mb: memory_mb,
            peak_memory_mb: *peak,
            elapsed: self.start_time.elapsed(),
        })
    }

    #[cfg(not(feature = "cli"))]
    pub fn sample(&self, _stage: &str) -> Option<StageStats> {
        None
    }

    pub fn log_stage(&self, stage: &str) {
        if let Some(stats) = self.sample(stage) {
            tracing::info!(
                "📊 {} - CPU: {:.1}%, Memory: {}MB, Peak: {}MB, Time: {:?}",
                stats.stage,
                stats.cpu_usage,
                stats.memory_usage_mb,
                stats.peak_memory_mb,
                stats.elapsed
            );
        }
    }

    pub fn log_final(&self) {
        if !self.enabled {
            return;
        }
        match self.sample("final") {
            Some(stats) => tracing::info!(
                "📊 Final Stats - Total Time: {:?}, Peak Memory: {}MB",
                stats.elapsed,
                stats.peak_memory_mb
            ),
            None => tracing::info!("📊 Final Stats - Total Time: {:?}", self.elapsed()),
        }
    }
}

impl Default for StageMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_monitor_samples_nothing() {
        let monitor = StageMonitor::default();
        assert!(!monitor.is_enabled());
        assert!(monitor.sample("extract").is_none());
        monitor.log_final();
    }
}
