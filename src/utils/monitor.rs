#[cfg(feature = "cli")]
use std::sync::Mutex;
#[cfg(feature = "cli")]
use std::time::{Duration, Instant};
#[cfg(feature = "cli")]
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Resource usage observed at the end of one build phase.
#[cfg(feature = "cli")]
#[derive(Debug, Clone)]
pub struct PhaseStats {
    pub phase: String,
    pub cpu_usage: f32,
    pub memory_mb: u64,
    pub peak_memory_mb: u64,
    /// Time since the previous sample.
    pub phase_time: Duration,
    pub total_time: Duration,
}

#[cfg(feature = "cli")]
struct Samples {
    system: System,
    last_sample: Instant,
    peak_memory_mb: u64,
    history: Vec<PhaseStats>,
}

/// Samples this process's CPU and memory between build phases.
#[cfg(feature = "cli")]
pub struct SystemMonitor {
    pid: Option<Pid>,
    started: Instant,
    samples: Mutex<Samples>,
}

#[cfg(feature = "cli")]
impl SystemMonitor {
    pub fn new(enabled: bool) -> Self {
        let pid = if enabled {
            sysinfo::get_current_pid()
                .map_err(|e| tracing::warn!("System monitoring disabled: {}", e))
                .ok()
        } else {
            None
        };

        let started = Instant::now();
        Self {
            pid,
            started,
            samples: Mutex::new(Samples {
                system: System::new(),
                last_sample: started,
                peak_memory_mb: 0,
                history: Vec::new(),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.pid.is_some()
    }

    /// Records the end of `phase`. `None` when monitoring is off.
    pub fn sample(&self, phase: &str) -> Option<PhaseStats> {
        let pid = self.pid?;
        let mut samples = self.samples.lock().ok()?;

        samples.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::everything(),
        );
        let process = samples.system.process(pid)?;
        let cpu_usage = process.cpu_usage();
        let memory_mb = process.memory() / 1024 / 1024;

        let now = Instant::now();
        samples.peak_memory_mb = samples.peak_memory_mb.max(memory_mb);
        let stats = PhaseStats {
            phase: phase.to_string(),
            cpu_usage,
            memory_mb,
            peak_memory_mb: samples.peak_memory_mb,
            phase_time: now.duration_since(samples.last_sample),
            total_time: now.duration_since(self.started),
        };
        samples.last_sample = now;
        samples.history.push(stats.clone());
        Some(stats)
    }

    pub fn log_phase(&self, phase: &str) {
        if let Some(stats) = self.sample(phase) {
            tracing::info!(
                "📊 {} - CPU: {:.1}%, Memory: {}MB, Peak: {}MB, Phase: {:?}",
                stats.phase,
                stats.cpu_usage,
                stats.memory_mb,
                stats.peak_memory_mb,
                stats.phase_time
            );
        }
    }

    pub fn log_summary(&self) {
        let Some(samples) = self.pid.and_then(|_| self.samples.lock().ok()) else {
            return;
        };
        let slowest = samples.history.iter().max_by_key(|s| s.phase_time);
        if let Some(slowest) = slowest {
            tracing::info!(
                "📊 Build took {:?}, peak memory {}MB, slowest phase: {} ({:?})",
                self.started.elapsed(),
                samples.peak_memory_mb,
                slowest.phase,
                slowest.phase_time
            );
        }
    }
}

// No-op monitor when built without the `cli` feature.
#[cfg(not(feature = "cli"))]
pub struct SystemMonitor;

#[cfg(not(feature = "cli"))]
impl SystemMonitor {
    pub fn new(_enabled: bool) -> Self {
        Self
    }

    pub fn is_enabled(&self) -> bool {
        false
    }

    pub fn log_phase(&self, _phase: &str) {}

    pub fn log_summary(&self) {}
}
