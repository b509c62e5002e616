//! Post-rate and momentum signals over a trend sample.
//!
//! All timestamps are `DateTime<Utc>` by the time they reach this module
//! (naive inputs are read as UTC when posts are deserialized), so ordering
//! and spans are plain arithmetic. Degenerate samples (fewer than two
//! timestamps, zero span) resolve to defined defaults, never to an error.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use tracing::trace;

use crate::error::{TrendError, TrendResult};
use crate::models::{clamp01, MomentumDirection, MomentumSignal, Post, TrendMetrics};

pub const MOMENTUM_BUCKETS: usize = 4;
const RISING_FACTOR: f64 = 1.2;
const DECLINING_FACTOR: f64 = 0.8;

#[derive(Debug, Clone, Copy)]
pub struct VelocityEstimator {
    acceleration_threshold: f64,
}

impl Default for VelocityEstimator {
    fn default() -> Self {
        Self::new(1.5)
    }
}

impl VelocityEstimator {
    pub fn new(acceleration_threshold: f64) -> Self {
        Self {
            acceleration_threshold,
        }
    }

    /// Posts per hour between the first and last timestamp inside the window.
    /// 0.0 for fewer than two posts or a zero span.
    pub fn velocity(&self, posts: &[Post], window_hours: f64) -> f64 {
        let ts = windowed_timestamps(posts, window_hours);
        match span_hours(&ts) {
            Ok(h) => ts.len() as f64 / h,
            Err(e) => {
                trace!(error = %e, posts = ts.len(), "velocity defaulted to 0");
                0.0
            }
        }
    }

    /// Compare activity (posts + engagement) of the first and last of four
    /// count-based buckets of the windowed, time-sorted sample.
    pub fn momentum(&self, posts: &[Post], window_hours: f64) -> MomentumSignal {
        let mut sample: Vec<&Post> = windowed(posts, window_hours);
        if let Err(e) = span_hours(&sample.iter().map(|p| p.created_at).collect::<Vec<_>>()) {
            trace!(error = %e, posts = sample.len(), "momentum defaulted to stable");
            return MomentumSignal::stable();
        }
        sample.sort_by_key(|p| p.created_at);

        let activities = bucket_activity(&sample);
        let (Some(&first), Some(&last)) = (activities.first(), activities.last()) else {
            return MomentumSignal::stable();
        };
        let max = activities.iter().copied().fold(0.0_f64, f64::max);

        let direction = if last > first * RISING_FACTOR {
            MomentumDirection::Rising
        } else if last < first * DECLINING_FACTOR {
            MomentumDirection::Declining
        } else {
            MomentumDirection::Stable
        };
        let momentum_score = if max > 0.0 {
            clamp01(0.5 + (last - first) / max)
        } else {
            0.0
        };
        let acceleration = if first > 0.0 { last / first } else { 0.0 };

        MomentumSignal {
            momentum_score,
            direction,
            acceleration,
        }
    }

    /// Whether the late-bucket activity grew by at least the configured ratio.
    pub fn is_accelerating(&self, signal: &MomentumSignal) -> bool {
        signal.direction == MomentumDirection::Rising
            && signal.acceleration >= self.acceleration_threshold
    }

    /// Volume, engagement, audience and rate snapshot of a sample.
    pub fn trend_metrics(&self, posts: &[Post], window_hours: f64) -> TrendMetrics {
        let volume = posts.len() as u64;
        let engagement: u64 = posts
            .iter()
            .fold(0u64, |acc, p| acc.saturating_add(p.engagement.total()));
        let unique_users = posts
            .iter()
            .filter(|p| !p.author_id.is_empty())
            .map(|p| p.author_id.as_str())
            .collect::<HashSet<_>>()
            .len() as u64;

        let all_ts: Vec<DateTime<Utc>> = posts.iter().map(|p| p.created_at).collect();
        let time_span_hours = span_hours(&all_ts).unwrap_or(1.0);

        TrendMetrics::new(
            volume,
            engagement,
            avg_engagement_rate(posts),
            unique_users,
            time_span_hours,
            self.velocity(posts, window_hours),
        )
    }
}

/// Mean engagement per follower over posts whose author follower count is
/// known; when none is, engagement per post scaled by 1/100.
pub fn avg_engagement_rate(posts: &[Post]) -> f64 {
    if posts.is_empty() {
        return 0.0;
    }
    let rates: Vec<f64> = posts
        .iter()
        .filter_map(|p| {
            let followers = p.author.as_ref()?.followers_count;
            (followers > 0).then(|| p.engagement.total() as f64 / followers as f64)
        })
        .collect();
    if !rates.is_empty() {
        return rates.iter().sum::<f64>() / rates.len() as f64;
    }
    let total: u64 = posts.iter().map(|p| p.engagement.total()).sum();
    total as f64 / posts.len() as f64 / 100.0
}

/// Hours between earliest and latest timestamp.
fn span_hours(ts: &[DateTime<Utc>]) -> TrendResult<f64> {
    if ts.len() < 2 {
        return Err(TrendError::ComputationGuard("fewer than two timestamps"));
    }
    let (Some(min), Some(max)) = (ts.iter().min(), ts.iter().max()) else {
        return Err(TrendError::ComputationGuard("empty timestamp set"));
    };
    let secs = (*max - *min).num_milliseconds() as f64 / 1000.0;
    if secs <= 0.0 {
        return Err(TrendError::ComputationGuard("zero time span"));
    }
    Ok(secs / 3600.0)
}

/// Posts no older than `window_hours` before the newest one. A non-positive
/// or non-finite window keeps everything.
fn windowed(posts: &[Post], window_hours: f64) -> Vec<&Post> {
    let Some(latest) = posts.iter().map(|p| p.created_at).max() else {
        return Vec::new();
    };
    if !(window_hours.is_finite() && window_hours > 0.0) {
        return posts.iter().collect();
    }
    let horizon = latest - Duration::milliseconds((window_hours * 3_600_000.0) as i64);
    posts.iter().filter(|p| p.created_at >= horizon).collect()
}

fn windowed_timestamps(posts: &[Post], window_hours: f64) -> Vec<DateTime<Utc>> {
    windowed(posts, window_hours)
        .into_iter()
        .map(|p| p.created_at)
        .collect()
}

/// Split into `min(4, n)` equal buckets, the last one absorbing the remainder.
fn bucket_activity(sorted: &[&Post]) -> Vec<f64> {
    let n = sorted.len();
    if n == 0 {
        return Vec::new();
    }
    let k = MOMENTUM_BUCKETS.min(n);
    let size = n / k;
    (0..k)
        .map(|i| {
            let start = i * size;
            let end = if i == k - 1 { n } else { start + size };
            let bucket = &sorted[start..end];
            let engagement: u64 = bucket.iter().map(|p| p.engagement.total()).sum();
            bucket.len() as f64 + engagement as f64
        })
        .collect()
}
