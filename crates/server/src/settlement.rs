//! Settlement status derivation and overview assembly.
//!
//! Money is integer cents. Revenue comes from completed assignments,
//! payouts from the append-only settlement record log; both are summed by
//! the store and re-derived on every load, never cached.

use chrono::{DateTime, Utc};
use kolflow_common::types::{PayoutMethod, ReviewStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    NoRevenue,
    Pending,
    PartiallyPaid,
    PaidOff,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::NoRevenue => "no_revenue",
            SettlementStatus::Pending => "pending",
            SettlementStatus::PartiallyPaid => "partially_paid",
            SettlementStatus::PaidOff => "paid_off",
        }
    }

    pub fn from_str(s: &str) -> Option<SettlementStatus> {
        match s {
            "no_revenue" => Some(SettlementStatus::NoRevenue),
            "pending" => Some(SettlementStatus::Pending),
            "partially_paid" => Some(SettlementStatus::PartiallyPaid),
            "paid_off" => Some(SettlementStatus::PaidOff),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Derivation {
    pub status: SettlementStatus,
    pub pending_cents: i64,
    /// Recorded payouts exceed earned revenue; a reconciliation warning,
    /// not an error. Pending is clamped to zero so it never renders
    /// negative.
    pub overpaid: bool,
}

/// Derive settlement status from accumulated revenue and payouts.
/// Pure and idempotent; rules are evaluated in order.
pub fn derive_settlement(total_revenue_cents: i64, total_settled_cents: i64) -> Derivation {
    let pending_cents = (total_revenue_cents - total_settled_cents).max(0);
    let status = if total_revenue_cents == 0 {
        SettlementStatus::NoRevenue
    } else if total_settled_cents == 0 {
        SettlementStatus::Pending
    } else if total_settled_cents < total_revenue_cents {
        SettlementStatus::PartiallyPaid
    } else {
        SettlementStatus::PaidOff
    };

    Derivation {
        status,
        pending_cents,
        overpaid: total_settled_cents > total_revenue_cents,
    }
}

/// Per-blogger balance as fetched from the store.
#[derive(Debug, Clone)]
pub struct BloggerBalance {
    pub user_id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub review_status: ReviewStatus,
    pub preferred_method: Option<PayoutMethod>,
    pub has_valid_payout_info: bool,
    pub total_revenue_cents: i64,
    pub total_settled_cents: i64,
    pub last_paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserSettlementSummary {
    pub user_id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub review_status: ReviewStatus,
    pub preferred_method: Option<PayoutMethod>,
    pub has_valid_payout_info: bool,
    pub total_revenue: i64,
    pub total_settled: i64,
    pub pending_settlement: i64,
    pub settlement_status: SettlementStatus,
    pub overpaid: bool,
    pub last_paid_at: Option<DateTime<Utc>>,
}

pub fn summarize(balance: BloggerBalance) -> UserSettlementSummary {
    let derived = derive_settlement(balance.total_revenue_cents, balance.total_settled_cents);
    UserSettlementSummary {
        user_id: balance.user_id,
        username: balance.username,
        display_name: balance.display_name,
        phone: balance.phone,
        city: balance.city,
        review_status: balance.review_status,
        preferred_method: balance.preferred_method,
        has_valid_payout_info: balance.has_valid_payout_info,
        total_revenue: balance.total_revenue_cents,
        total_settled: balance.total_settled_cents,
        pending_settlement: derived.pending_cents,
        settlement_status: derived.status,
        overpaid: derived.overpaid,
        last_paid_at: balance.last_paid_at,
    }
}

impl UserSettlementSummary {
    pub fn matches_keyword(&self, keyword: &str) -> bool {
        let keyword = keyword.to_lowercase();
        self.username.to_lowercase().contains(&keyword)
            || self
                .display_name
                .as_deref()
                .is_some_and(|n| n.to_lowercase().contains(&keyword))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementOverview {
    pub generated_at: DateTime<Utc>,
    pub blogger_count: u32,
    pub total_revenue: i64,
    pub total_settled: i64,
    pub total_pending: i64,
    pub pending_blogger_count: u32,
    pub users: Vec<UserSettlementSummary>,
}

pub fn build_overview(users: Vec<UserSettlementSummary>) -> SettlementOverview {
    let pending_blogger_count = users.iter().filter(|u| u.pending_settlement > 0).count() as u32;
    SettlementOverview {
        generated_at: Utc::now(),
        blogger_count: users.len() as u32,
        total_revenue: users.iter().map(|u| u.total_revenue).sum(),
        total_settled: users.iter().map(|u| u.total_settled).sum(),
        total_pending: users.iter().map(|u| u.pending_settlement).sum(),
        pending_blogger_count,
        users,
    }
}
