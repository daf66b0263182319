//! Remaining-time estimation for running jobs.
//!
//! Keeps a moving window of recent progress rates (fraction per second)
//! and projects the time needed for the remaining fraction. Timestamps
//! are passed in by the caller so the estimator stays clock-free.

use std::collections::VecDeque;

use crate::types::Timestamp;

/// Number of recent rate samples averaged for the estimate.
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// Moving-average ETA estimator fed with `(progress, time)` samples.
#[derive(Debug, Clone)]
pub struct EtaCalculator {
    window_size: usize,
    rates: VecDeque<f64>,
    last: Option<(Timestamp, f64)>,
}

impl Default for EtaCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

impl EtaCalculator {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            rates: VecDeque::with_capacity(window_size.max(1)),
            last: None,
        }
    }

    /// Record that the job reached `progress` at time `at`.
    ///
    /// Samples that do not move forward in both time and progress only
    /// update the reference point.
    pub fn record(&mut self, progress: f64, at: Timestamp) {
        let progress = progress.clamp(0.0, 1.0);

        if let Some((prev_at, prev_progress)) = self.last {
            let elapsed = (at - prev_at).num_milliseconds() as f64 / 1000.0;
            let delta = progress - prev_progress;
            if elapsed > 0.0 && delta > 0.0 {
                if self.rates.len() == self.window_size {
                    self.rates.pop_front();
                }
                self.rates.push_back(delta / elapsed);
            }
        }
        self.last = Some((at, progress));
    }

    /// Average progress fraction per second over the window.
    pub fn speed(&self) -> Option<f64> {
        if self.rates.is_empty() {
            return None;
        }
        Some(self.rates.iter().sum::<f64>() / self.rates.len() as f64)
    }

    /// Estimated seconds until completion, or `None` without enough data.
    pub fn eta_seconds(&self) -> Option<u64> {
        let (_, progress) = self.last?;
        if progress >= 1.0 {
            return Some(0);
        }
        let speed = self.speed()?;
        if speed <= 0.0 {
            return None;
        }
        Some(((1.0 - progress) / speed).round() as u64)
    }

    /// Throughput rendered as `"2.5 queries/sec"`, for a job issuing
    /// `total_queries` model queries in all.
    pub fn speed_str(&self, total_queries: u64) -> Option<String> {
        let per_second = self.speed()? * total_queries as f64;
        (per_second > 0.0).then(|| format!("{per_second:.1} queries/sec"))
    }
}

/// Render a duration as `45s`, `2m 30s`, `2m`, `1h 5m` or `3h`.
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }

    let minutes = seconds / 60;
    let remaining_seconds = seconds % 60;
    if minutes < 60 {
        return if remaining_seconds > 0 {
            format!("{minutes}m {remaining_seconds}s")
        } else {
            format!("{minutes}m")
        };
    }

    let hours = minutes / 60;
    let remaining_minutes = minutes % 60;
    if remaining_minutes > 0 {
        format!("{hours}h {remaining_minutes}m")
    } else {
        format!("{hours}h")
    }
}
