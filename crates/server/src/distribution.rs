//! Eligibility ranking and accept-limit saturation estimation.
//!
//! Everything here is pure computation over an already-fetched blogger
//! snapshot; the store query lives in [`crate::db`].

use serde::Serialize;

/// Accept limits outside this range are downgraded to "unlimited" rather
/// than rejected, so the admin preview stays usable while editing.
pub const ACCEPT_LIMIT_MIN: i64 = 1;
pub const ACCEPT_LIMIT_MAX: i64 = 50_000;

pub const PREVIEW_LIMIT_DEFAULT: usize = 10;
pub const PREVIEW_LIMIT_MAX: usize = 100;

/// Snapshot of an eligible blogger, as ranked and previewed.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BloggerProfile {
    pub user_id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub follower_total: i64,
    pub avg_views: i64,
    pub weight: f64,
}

/// Rank candidates: weight, then average views, then follower total, all
/// descending, with user id ascending as the deterministic tie-break.
pub fn rank_bloggers(bloggers: &mut [BloggerProfile]) {
    bloggers.sort_by(|a, b| {
        b.weight
            .total_cmp(&a.weight)
            .then_with(|| b.avg_views.cmp(&a.avg_views))
            .then_with(|| b.follower_total.cmp(&a.follower_total))
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
}

/// Recommended distribution scale as a fraction-of-pool band. The ratios
/// are backend policy, tunable via env (`SCALE_MIN_RATIO` / `SCALE_MAX_RATIO`).
#[derive(Debug, Clone, Copy)]
pub struct ScalePolicy {
    pub min_ratio: f64,
    pub max_ratio: f64,
}

impl Default for ScalePolicy {
    fn default() -> Self {
        Self {
            min_ratio: 0.2,
            max_ratio: 0.6,
        }
    }
}

impl ScalePolicy {
    /// Inclusive recommendation band. `(0, 0)` means no recommendation.
    pub fn band(&self, eligible_count: u32) -> (u32, u32) {
        if eligible_count == 0 {
            return (0, 0);
        }
        let n = eligible_count as f64;
        let min = ((n * self.min_ratio).floor() as u32)
            .max(1)
            .min(eligible_count);
        let max = ((n * self.max_ratio).ceil() as u32).clamp(min, eligible_count);
        (min, max)
    }
}

/// Validate a raw accept limit. Out-of-range values fall back to unlimited
/// and surface a warning instead of failing the whole estimate.
pub fn sanitize_accept_limit(raw: Option<i64>) -> (Option<u32>, Option<String>) {
    match raw {
        None => (None, None),
        Some(v) if (ACCEPT_LIMIT_MIN..=ACCEPT_LIMIT_MAX).contains(&v) => (Some(v as u32), None),
        Some(v) => (
            None,
            Some(format!(
                "accept_limit {v} is outside [{ACCEPT_LIMIT_MIN}, {ACCEPT_LIMIT_MAX}]; treated as unlimited"
            )),
        ),
    }
}

pub fn clamp_preview_limit(raw: Option<i64>) -> usize {
    match raw {
        None => PREVIEW_LIMIT_DEFAULT,
        Some(v) => (v.max(1) as usize).min(PREVIEW_LIMIT_MAX),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Estimate {
    pub eligible_count: u32,
    pub estimated_accept_count: u32,
    pub input_accept_limit: Option<u32>,
    pub saturation_rate: f64,
    pub saturation_label: String,
    /// Non-fatal warning: empty pool, downgraded accept limit.
    pub advisory: Option<String>,
    pub recommended_scale_min: u32,
    pub recommended_scale_max: u32,
    pub preview_bloggers: Vec<BloggerProfile>,
    pub preview_limit: usize,
}

/// Estimate acceptance saturation for a platform-filtered pool.
///
/// With no accept limit every eligible blogger could self-accept, so the
/// estimate equals the pool size and the rate is reported as 0 (the ratio
/// is only meaningful against a limit).
pub fn estimate(
    mut pool: Vec<BloggerProfile>,
    raw_accept_limit: Option<i64>,
    preview_limit: usize,
    policy: ScalePolicy,
) -> Estimate {
    let (accept_limit, limit_warning) = sanitize_accept_limit(raw_accept_limit);

    rank_bloggers(&mut pool);
    let eligible_count = pool.len() as u32;

    let estimated_accept_count = match accept_limit {
        Some(limit) => limit.min(eligible_count),
        None => eligible_count,
    };

    let saturation_rate = match accept_limit {
        Some(limit) if limit > 0 => {
            (f64::from(estimated_accept_count) / f64::from(limit)).clamp(0.0, 1.0)
        }
        _ => 0.0,
    };

    let advisory = if eligible_count == 0 {
        Some("no eligible bloggers on this platform".to_string())
    } else {
        limit_warning
    };

    let (recommended_scale_min, recommended_scale_max) = policy.band(eligible_count);
    let preview_limit = preview_limit.clamp(1, PREVIEW_LIMIT_MAX);
    pool.truncate(preview_limit);

    Estimate {
        eligible_count,
        estimated_accept_count,
        input_accept_limit: accept_limit,
        saturation_rate,
        saturation_label: saturation_label(eligible_count, accept_limit, saturation_rate),
        advisory,
        recommended_scale_min,
        recommended_scale_max,
        preview_bloggers: pool,
        preview_limit,
    }
}

fn saturation_label(eligible_count: u32, accept_limit: Option<u32>, rate: f64) -> String {
    if eligible_count == 0 {
        return "empty pool".to_string();
    }
    match accept_limit {
        None => "unlimited".to_string(),
        Some(_) if rate >= 1.0 => "accept limit expected to fill".to_string(),
        Some(_) if rate >= 0.5 => "eligible pool covers part of the accept limit".to_string(),
        Some(_) => "accept limit far exceeds the eligible pool".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blogger(user_id: i64, weight: f64, avg_views: i64, followers: i64) -> BloggerProfile {
        BloggerProfile {
            user_id,
            username: format!("blogger{user_id}"),
            display_name: None,
            follower_total: followers,
            avg_views,
            weight,
        }
    }

    #[test]
    fn ranking_orders_by_weight_views_followers_then_id() {
        let mut pool = vec![
            blogger(5, 1.0, 100, 1000),
            blogger(2, 2.0, 50, 10),
            blogger(3, 1.0, 100, 2000),
            blogger(1, 1.0, 100, 1000),
        ];
        rank_bloggers(&mut pool);
        let ids: Vec<i64> = pool.iter().map(|b| b.user_id).collect();
        assert_eq!(ids, vec![2, 3, 1, 5]);
    }

    #[test]
    fn ranking_is_deterministic() {
        let pool = vec![
            blogger(3, 1.0, 10, 10),
            blogger(1, 1.0, 10, 10),
            blogger(2, 1.0, 10, 10),
        ];
        let mut a = pool.clone();
        let mut b = pool;
        rank_bloggers(&mut a);
        rank_bloggers(&mut b);
        assert_eq!(a, b);
        assert_eq!(a[0].user_id, 1);
    }

    #[test]
    fn limit_within_pool_estimates_the_limit() {
        // Pool of 5 with weights [1,1,2,1,1], limit 3.
        let pool = vec![
            blogger(1, 1.0, 0, 0),
            blogger(2, 1.0, 0, 0),
            blogger(3, 2.0, 0, 0),
            blogger(4, 1.0, 0, 0),
            blogger(5, 1.0, 0, 0),
        ];
        let est = estimate(pool, Some(3), 10, ScalePolicy::default());
        assert_eq!(est.eligible_count, 5);
        assert_eq!(est.estimated_accept_count, 3);
        assert_eq!(est.saturation_rate, 1.0);
        assert_eq!(est.preview_bloggers[0].user_id, 3);
    }

    #[test]
    fn limit_beyond_pool_estimates_the_pool() {
        let pool = vec![blogger(1, 1.0, 0, 0), blogger(2, 1.0, 0, 0)];
        let est = estimate(pool, Some(10), 10, ScalePolicy::default());
        assert_eq!(est.estimated_accept_count, 2);
        assert!((est.saturation_rate - 0.2).abs() < 1e-9);
        assert!(est.saturation_rate >= 0.0 && est.saturation_rate <= 1.0);
    }

    #[test]
    fn no_limit_estimates_full_pool_with_zero_rate() {
        let pool = vec![blogger(1, 1.0, 0, 0), blogger(2, 1.0, 0, 0)];
        let est = estimate(pool, None, 10, ScalePolicy::default());
        assert_eq!(est.estimated_accept_count, 2);
        assert_eq!(est.saturation_rate, 0.0);
        assert_eq!(est.input_accept_limit, None);
        assert_eq!(est.saturation_label, "unlimited");
    }

    #[test]
    fn empty_pool_returns_advisory() {
        let est = estimate(Vec::new(), Some(5), 10, ScalePolicy::default());
        assert_eq!(est.eligible_count, 0);
        assert_eq!(est.estimated_accept_count, 0);
        assert!(est.advisory.as_deref().is_some_and(|a| !a.is_empty()));
        assert_eq!(est.recommended_scale_max, 0);
    }

    #[test]
    fn out_of_range_limit_downgrades_to_unlimited() {
        let pool = vec![blogger(1, 1.0, 0, 0)];
        for bad in [0, -3, 50_001] {
            let est = estimate(pool.clone(), Some(bad), 10, ScalePolicy::default());
            assert_eq!(est.input_accept_limit, None, "limit {bad}");
            assert_eq!(est.saturation_rate, 0.0);
            assert!(est.advisory.as_deref().is_some_and(|a| a.contains("unlimited")));
        }
    }

    #[test]
    fn preview_respects_its_limit() {
        let pool = (1..=20).map(|i| blogger(i, 1.0, 0, 0)).collect();
        let est = estimate(pool, None, 5, ScalePolicy::default());
        assert_eq!(est.preview_bloggers.len(), 5);
        assert_eq!(est.preview_limit, 5);
        assert_eq!(est.eligible_count, 20);
    }

    #[test]
    fn preview_limit_clamps() {
        assert_eq!(clamp_preview_limit(None), PREVIEW_LIMIT_DEFAULT);
        assert_eq!(clamp_preview_limit(Some(0)), 1);
        assert_eq!(clamp_preview_limit(Some(-5)), 1);
        assert_eq!(clamp_preview_limit(Some(1000)), PREVIEW_LIMIT_MAX);
        assert_eq!(clamp_preview_limit(Some(42)), 42);
    }

    #[test]
    fn scale_band_bounds_are_ordered() {
        let policy = ScalePolicy::default();
        for n in [0u32, 1, 2, 5, 10, 100, 5000] {
            let (min, max) = policy.band(n);
            assert!(max >= min, "band for {n}");
            if n == 0 {
                assert_eq!((min, max), (0, 0));
            } else {
                assert!(min >= 1);
                assert!(max <= n);
            }
        }
    }

    #[test]
    fn scale_band_default_ratios() {
        let (min, max) = ScalePolicy::default().band(10);
        assert_eq!((min, max), (2, 6));
    }
}
