//! # Pool configuration and runtime tunables.
//!
//! [`Config`] holds every knob the dispatcher reads: pool size bounds, the
//! per-task deadline, the per-worker execution quota, idle retirement, and
//! the respawn backoff used when worker spawns keep failing.
//!
//! Most fields can also be changed on a live pool through
//! [`Dispatcher::set_option`](crate::Dispatcher::set_option), which takes a
//! [`PoolOption`] (key and value in one) and returns the prior value. An
//! option change never retroactively alters work already running; it takes
//! effect at the next spawn/assign/recycle decision.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use taskpool::Config;
//!
//! let mut cfg = Config::default();
//! cfg.pool_size_max = 4;
//! cfg.task_timeout = Some(Duration::from_secs(5));
//! cfg.exec_limit = None; // workers are never recycled by quota
//!
//! assert_eq!(cfg.pool_size_max, 4);
//! ```

use std::time::Duration;

use crate::error::OptionError;
use crate::policies::BackoffPolicy;

/// Configuration for the dispatcher and its worker pool.
#[derive(Clone, Debug)]
pub struct Config {
    /// Floor on live workers; the pool is replenished up to this count.
    pub pool_size_min: usize,
    /// Ceiling on live workers.
    pub pool_size_max: usize,
    /// Per-task wall-clock deadline, measured from submission
    /// (`None` = unbounded).
    pub task_timeout: Option<Duration>,
    /// Tasks a worker executes before being recycled (`None` = unbounded).
    pub exec_limit: Option<u64>,
    /// Opaque flag mask snapshotted into each spawned worker; tasks can read
    /// it via [`Resolver::context_flags`](crate::Resolver::context_flags).
    pub thread_flags: u64,
    /// Idle duration after which a worker above the pool minimum is retired.
    pub idle_worker_timeout: Duration,
    /// Cadence of the idle-retirement sweep.
    pub sweep_interval: Duration,
    /// Capacity of the event bus channel.
    pub bus_capacity: usize,
    /// Delay policy between consecutive failed worker spawns.
    pub respawn_backoff: BackoffPolicy,
}

impl Default for Config {
    /// Provides the default configuration:
    /// - `pool_size_min = 1`, `pool_size_max = 8`
    /// - `task_timeout = 30s`
    /// - `exec_limit = 1024`
    /// - `thread_flags = 0`
    /// - `idle_worker_timeout = 10s`, `sweep_interval = 1s`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            pool_size_min: 1,
            pool_size_max: 8,
            task_timeout: Some(Duration::from_secs(30)),
            exec_limit: Some(1024),
            thread_flags: 0,
            idle_worker_timeout: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(1),
            bus_capacity: 1024,
            respawn_backoff: BackoffPolicy::default(),
        }
    }
}

impl Config {
    /// Bus capacity with a floor of 16; a zero capacity would wedge event
    /// delivery.
    pub(crate) fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(16)
    }

    /// Applies one option to this configuration and returns the prior value
    /// as the same [`PoolOption`] variant.
    ///
    /// Validation happens here, before anything is mutated; on error the
    /// configuration is unchanged.
    pub fn apply(&mut self, opt: PoolOption) -> Result<PoolOption, OptionError> {
        match opt {
            PoolOption::PoolSizeMin(n) => {
                if n > self.pool_size_max {
                    return Err(invalid(
                        "PoolSizeMin",
                        format!("{n} exceeds PoolSizeMax {}", self.pool_size_max),
                    ));
                }
                Ok(PoolOption::PoolSizeMin(std::mem::replace(
                    &mut self.pool_size_min,
                    n,
                )))
            }
            PoolOption::PoolSizeMax(n) => {
                if n == 0 {
                    return Err(invalid("PoolSizeMax", "must be at least 1".into()));
                }
                if n < self.pool_size_min {
                    return Err(invalid(
                        "PoolSizeMax",
                        format!("{n} is below PoolSizeMin {}", self.pool_size_min),
                    ));
                }
                Ok(PoolOption::PoolSizeMax(std::mem::replace(
                    &mut self.pool_size_max,
                    n,
                )))
            }
            PoolOption::TaskTimeout(secs) => {
                if secs < -1 {
                    return Err(invalid("TaskTimeout", format!("{secs} is below -1")));
                }
                let prior = encode_timeout(self.task_timeout);
                self.task_timeout = decode_timeout(secs);
                Ok(PoolOption::TaskTimeout(prior))
            }
            PoolOption::ExecLimit(limit) => {
                if limit < -1 || limit == 0 {
                    return Err(invalid(
                        "ExecLimit",
                        format!("{limit} (use -1 for unbounded, or a positive count)"),
                    ));
                }
                let prior = match self.exec_limit {
                    Some(l) => l as i64,
                    None => -1,
                };
                self.exec_limit = if limit == -1 { None } else { Some(limit as u64) };
                Ok(PoolOption::ExecLimit(prior))
            }
            PoolOption::ThreadFlags(flags) => Ok(PoolOption::ThreadFlags(std::mem::replace(
                &mut self.thread_flags,
                flags,
            ))),
            PoolOption::IdleWorkerTimeout(secs) => {
                if secs < 1 {
                    return Err(invalid(
                        "IdleWorkerTimeout",
                        format!("{secs} (must be at least 1 second)"),
                    ));
                }
                let prior = self.idle_worker_timeout.as_secs() as i64;
                self.idle_worker_timeout = Duration::from_secs(secs as u64);
                Ok(PoolOption::IdleWorkerTimeout(prior))
            }
        }
    }
}

/// A runtime-tunable option: key and value in one.
///
/// Passed to [`Dispatcher::set_option`](crate::Dispatcher::set_option);
/// the prior value comes back as the same variant. Durations are expressed
/// in whole seconds; `TaskTimeout` accepts `0` or `-1` for "unbounded",
/// `ExecLimit` accepts `-1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolOption {
    /// Floor on live workers. Raising it spawns workers immediately.
    PoolSizeMin(usize),
    /// Ceiling on live workers. Lowering it lets excess workers drain as
    /// they return to idle.
    PoolSizeMax(usize),
    /// Per-task deadline in seconds; `0` or `-1` means unbounded.
    TaskTimeout(i64),
    /// Tasks per worker before recycling; `-1` means unbounded.
    ExecLimit(i64),
    /// Opaque flag mask for subsequently spawned workers.
    ThreadFlags(u64),
    /// Idle retirement threshold in seconds (minimum 1).
    IdleWorkerTimeout(i64),
}

fn invalid(option: &'static str, reason: String) -> OptionError {
    OptionError::InvalidValue { option, reason }
}

fn encode_timeout(timeout: Option<Duration>) -> i64 {
    match timeout {
        Some(d) => d.as_secs() as i64,
        None => -1,
    }
}

fn decode_timeout(secs: i64) -> Option<Duration> {
    match secs {
        0 | -1 => None,
        s => Some(Duration::from_secs(s as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_returns_prior_value() {
        let mut cfg = Config::default();
        let prior = cfg.apply(PoolOption::PoolSizeMax(4)).unwrap();
        assert_eq!(prior, PoolOption::PoolSizeMax(8));
        assert_eq!(cfg.pool_size_max, 4);
    }

    #[test]
    fn min_above_max_is_rejected() {
        let mut cfg = Config::default();
        let err = cfg.apply(PoolOption::PoolSizeMin(9)).unwrap_err();
        assert!(matches!(err, OptionError::InvalidValue { option: "PoolSizeMin", .. }));
        assert_eq!(cfg.pool_size_min, 1);
    }

    #[test]
    fn max_below_min_is_rejected() {
        let mut cfg = Config::default();
        cfg.apply(PoolOption::PoolSizeMin(3)).unwrap();
        let err = cfg.apply(PoolOption::PoolSizeMax(2)).unwrap_err();
        assert!(matches!(err, OptionError::InvalidValue { option: "PoolSizeMax", .. }));
    }

    #[test]
    fn zero_max_is_rejected() {
        let mut cfg = Config::default();
        cfg.apply(PoolOption::PoolSizeMin(0)).unwrap();
        assert!(cfg.apply(PoolOption::PoolSizeMax(0)).is_err());
    }

    #[test]
    fn timeout_zero_and_minus_one_mean_unbounded() {
        let mut cfg = Config::default();
        cfg.apply(PoolOption::TaskTimeout(0)).unwrap();
        assert_eq!(cfg.task_timeout, None);

        // Prior value of an unbounded timeout reads back as -1.
        let prior = cfg.apply(PoolOption::TaskTimeout(7)).unwrap();
        assert_eq!(prior, PoolOption::TaskTimeout(-1));
        assert_eq!(cfg.task_timeout, Some(Duration::from_secs(7)));

        cfg.apply(PoolOption::TaskTimeout(-1)).unwrap();
        assert_eq!(cfg.task_timeout, None);
    }

    #[test]
    fn exec_limit_zero_is_rejected() {
        let mut cfg = Config::default();
        assert!(cfg.apply(PoolOption::ExecLimit(0)).is_err());
        cfg.apply(PoolOption::ExecLimit(-1)).unwrap();
        assert_eq!(cfg.exec_limit, None);
    }

    #[test]
    fn idle_timeout_must_be_positive() {
        let mut cfg = Config::default();
        assert!(cfg.apply(PoolOption::IdleWorkerTimeout(0)).is_err());
        cfg.apply(PoolOption::IdleWorkerTimeout(3)).unwrap();
        assert_eq!(cfg.idle_worker_timeout, Duration::from_secs(3));
    }
}
