use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Shared domain enums. Wire format is snake_case throughout.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Douyin,
    Xiaohongshu,
    Weibo,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Douyin, Platform::Xiaohongshu, Platform::Weibo];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Douyin => "douyin",
            Platform::Xiaohongshu => "xiaohongshu",
            Platform::Weibo => "weibo",
        }
    }

    /// Resolve a platform tag, accepting the short and Chinese aliases the
    /// admin UI has historically sent.
    pub fn from_tag(tag: &str) -> Option<Platform> {
        match tag.trim().to_lowercase().as_str() {
            "douyin" | "dy" | "抖音" => Some(Platform::Douyin),
            "xiaohongshu" | "xhs" | "小红书" => Some(Platform::Xiaohongshu),
            "weibo" | "wb" | "微博" => Some(Platform::Weibo),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Blogger,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Blogger => "blogger",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    UnderReview,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::UnderReview => "under_review",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<ReviewStatus> {
        match s {
            "pending" => Some(ReviewStatus::Pending),
            "under_review" => Some(ReviewStatus::UnderReview),
            "approved" => Some(ReviewStatus::Approved),
            "rejected" => Some(ReviewStatus::Rejected),
            _ => None,
        }
    }

    /// Review state machine: pending accounts must pass through
    /// under_review, approval is terminal, rejected accounts can only
    /// re-enter review.
    pub fn can_transition_to(&self, next: ReviewStatus) -> bool {
        match self {
            ReviewStatus::Pending => next == ReviewStatus::UnderReview,
            ReviewStatus::UnderReview => {
                matches!(next, ReviewStatus::Approved | ReviewStatus::Rejected)
            }
            ReviewStatus::Approved => next == ReviewStatus::Approved,
            ReviewStatus::Rejected => next == ReviewStatus::UnderReview,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Draft,
    Published,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Draft => "draft",
            TaskStatus::Published => "published",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<TaskStatus> {
        match s {
            "draft" => Some(TaskStatus::Draft),
            "published" => Some(TaskStatus::Published),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Accepted,
    Submitted,
    InReview,
    Rejected,
    Completed,
    Cancelled,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Accepted => "accepted",
            AssignmentStatus::Submitted => "submitted",
            AssignmentStatus::InReview => "in_review",
            AssignmentStatus::Rejected => "rejected",
            AssignmentStatus::Completed => "completed",
            AssignmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<AssignmentStatus> {
        match s {
            "accepted" => Some(AssignmentStatus::Accepted),
            "submitted" => Some(AssignmentStatus::Submitted),
            "in_review" => Some(AssignmentStatus::InReview),
            "rejected" => Some(AssignmentStatus::Rejected),
            "completed" => Some(AssignmentStatus::Completed),
            "cancelled" => Some(AssignmentStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutMethod {
    BankCard,
    Alipay,
    WechatPay,
    Paypal,
    Other,
}

impl PayoutMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutMethod::BankCard => "bank_card",
            PayoutMethod::Alipay => "alipay",
            PayoutMethod::WechatPay => "wechat_pay",
            PayoutMethod::Paypal => "paypal",
            PayoutMethod::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<PayoutMethod> {
        match s {
            "bank_card" => Some(PayoutMethod::BankCard),
            "alipay" => Some(PayoutMethod::Alipay),
            "wechat_pay" => Some(PayoutMethod::WechatPay),
            "paypal" => Some(PayoutMethod::Paypal),
            "other" => Some(PayoutMethod::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}
