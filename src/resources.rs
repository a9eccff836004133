use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use sysinfo::{MINIMUM_CPU_UPDATE_INTERVAL, System};
use tracing::info;

/// How often an interruptible sleep re-checks the stop flag.
const SLEEP_SLICE: Duration = Duration::from_millis(200);

/// CPU and memory load at one point in time, in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSample {
    pub cpu_percent: f32,
    pub memory_percent: f32,
}

pub trait ResourceSampler {
    fn sample(&mut self) -> ResourceSample;
}

/// Blocks the current thread; injectable so tests never really sleep.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Samples the host with `sysinfo`.
pub struct SystemSampler {
    sys: System,
}

impl SystemSampler {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for SystemSampler {
    fn sample(&mut self) -> ResourceSample {
        // CPU usage is a delta between two refreshes.
        self.sys.refresh_cpu();
        thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL);
        self.sys.refresh_cpu();
        self.sys.refresh_memory();

        let total = self.sys.total_memory();
        let memory_percent = if total == 0 {
            0.0
        } else {
            (self.sys.used_memory() as f64 / total as f64 * 100.0) as f32
        };

        ResourceSample {
            cpu_percent: self.sys.global_cpu_info().cpu_usage(),
            memory_percent,
        }
    }
}

/// Sleeps in short slices and returns early once `stop` is set.
#[derive(Debug, Clone)]
pub struct ThreadSleeper {
    stop: Arc<AtomicBool>,
}

impl ThreadSleeper {
    pub fn new(stop: Arc<AtomicBool>) -> Self {
        Self { stop }
    }
}

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        let mut left = duration;
        while !left.is_zero() && !self.stop.load(Ordering::SeqCst) {
            let step = left.min(SLEEP_SLICE);
            thread::sleep(step);
            left -= step;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateLimits {
    pub max_cpu_percent: f32,
    pub max_memory_percent: f32,
    pub poll_interval: Duration,
}

impl Default for GateLimits {
    fn default() -> Self {
        Self {
            max_cpu_percent: 50.0,
            max_memory_percent: 90.0,
            poll_interval: Duration::from_secs(5),
        }
    }
}

impl GateLimits {
    pub fn allows(&self, sample: &ResourceSample) -> bool {
        sample.cpu_percent <= self.max_cpu_percent && sample.memory_percent <= self.max_memory_percent
    }
}

/// Holds work back while the machine is busy.
pub struct ResourceGate<S> {
    sampler: S,
    limits: GateLimits,
}

impl<S: ResourceSampler> ResourceGate<S> {
    pub fn new(sampler: S, limits: GateLimits) -> Self {
        Self { sampler, limits }
    }

    /// Wait until load is under the limits.
    ///
    /// Returns `false` if `stop` was set while waiting.
    pub fn wait_until_ready(&mut self, sleeper: &dyn Sleeper, stop: &AtomicBool) -> bool {
        loop {
            if stop.load(Ordering::SeqCst) {
                return false;
            }
            let sample = self.sampler.sample();
            if self.limits.allows(&sample) {
                return true;
            }
            info!(
                "resource usage high (cpu {:.1}%, ram {:.1}%), waiting...",
                sample.cpu_percent, sample.memory_percent
            );
            sleeper.sleep(self.limits.poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::*;

    struct Scripted(VecDeque<ResourceSample>);

    impl ResourceSampler for Scripted {
        fn sample(&mut self) -> ResourceSample {
            self.0.pop_front().unwrap_or(ResourceSample {
                cpu_percent: 0.0,
                memory_percent: 0.0,
            })
        }
    }

    #[derive(Default)]
    struct Recorder(RefCell<Vec<Duration>>);

    impl Sleeper for Recorder {
        fn sleep(&self, duration: Duration) {
            self.0.borrow_mut().push(duration);
        }
    }

    fn busy() -> ResourceSample {
        ResourceSample {
            cpu_percent: 95.0,
            memory_percent: 20.0,
        }
    }

    #[test]
    fn waits_while_busy_then_proceeds() {
        let sampler = Scripted(VecDeque::from([busy(), busy()]));
        let mut gate = ResourceGate::new(sampler, GateLimits::default());
        let sleeper = Recorder::default();
        let stop = AtomicBool::new(false);

        assert!(gate.wait_until_ready(&sleeper, &stop));
        assert_eq!(*sleeper.0.borrow(), vec![Duration::from_secs(5); 2]);
    }

    #[test]
    fn stop_flag_ends_the_wait() {
        let sampler = Scripted(VecDeque::from([busy()]));
        let mut gate = ResourceGate::new(sampler, GateLimits::default());
        let stop = AtomicBool::new(true);
        assert!(!gate.wait_until_ready(&Recorder::default(), &stop));
    }

    #[test]
    fn limits_are_inclusive() {
        let limits = GateLimits::default();
        assert!(limits.allows(&ResourceSample {
            cpu_percent: 50.0,
            memory_percent: 90.0
        }));
        assert!(!limits.allows(&ResourceSample {
            cpu_percent: 50.0,
            memory_percent: 90.1
        }));
    }

    #[test]
    fn thread_sleeper_returns_immediately_when_stopped() {
        let stop = Arc::new(AtomicBool::new(true));
        let started = std::time::Instant::now();
        ThreadSleeper::new(stop).sleep(Duration::from_secs(30));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
