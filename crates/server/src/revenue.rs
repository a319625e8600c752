//! Revenue calculation for completed assignments.
//!
//! `revenue = base_reward + engagement_score × platform_coef × user_weight`,
//! with per-platform metric weights configurable through the store and a
//! `default` row as fallback.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RevenueConfig {
    pub platform_coef: f64,
    pub like_weight: f64,
    pub favorite_weight: f64,
    pub share_weight: f64,
    pub view_weight: f64,
}

impl Default for RevenueConfig {
    fn default() -> Self {
        Self {
            platform_coef: 1.0,
            like_weight: 1.0,
            favorite_weight: 2.0,
            share_weight: 3.0,
            view_weight: 0.01,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct EngagementMetrics {
    #[serde(default)]
    pub likes: i64,
    #[serde(default)]
    pub favorites: i64,
    #[serde(default)]
    pub shares: i64,
    #[serde(default)]
    pub views: i64,
}

pub fn engagement_score(metrics: &EngagementMetrics, config: &RevenueConfig) -> f64 {
    metrics.likes as f64 * config.like_weight
        + metrics.favorites as f64 * config.favorite_weight
        + metrics.shares as f64 * config.share_weight
        + metrics.views as f64 * config.view_weight
}

/// Final assignment revenue in cents, rounded half-up.
pub fn revenue_cents(
    base_reward_cents: i64,
    user_weight: f64,
    engagement_score: f64,
    platform_coef: f64,
) -> i64 {
    base_reward_cents + (engagement_score * platform_coef * user_weight * 100.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engagement_score_weights_metrics() {
        let metrics = EngagementMetrics {
            likes: 10,
            favorites: 5,
            shares: 2,
            views: 1000,
        };
        let score = engagement_score(&metrics, &RevenueConfig::default());
        // 10*1 + 5*2 + 2*3 + 1000*0.01
        assert!((score - 36.0).abs() < 1e-9);
    }

    #[test]
    fn revenue_combines_base_and_weighted_score() {
        // 50.00 base + 36 * 1.0 coef * 1.5 weight = 104.00
        let cents = revenue_cents(5_000, 1.5, 36.0, 1.0);
        assert_eq!(cents, 10_400);
    }

    #[test]
    fn zero_engagement_pays_base_reward() {
        let score = engagement_score(&EngagementMetrics::default(), &RevenueConfig::default());
        assert_eq!(revenue_cents(2_500, 2.0, score, 1.2), 2_500);
    }

    #[test]
    fn fractional_revenue_rounds_to_cents() {
        // 0.333 * 1 * 1 => 33.3 cents => 33
        assert_eq!(revenue_cents(0, 1.0, 0.333, 1.0), 33);
        // 0.335 => 33.5 => 34
        assert_eq!(revenue_cents(0, 1.0, 0.335, 1.0), 34);
    }
}
