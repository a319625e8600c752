//! SQLite store. Aggregates (revenue, payouts) are summed on every read;
//! the payout log is append-only and never mutated in place.

use crate::distribution::BloggerProfile;
use crate::error::ServerError;
use crate::revenue::RevenueConfig;
use crate::settlement::BloggerBalance;
use chrono::{DateTime, Utc};
use kolflow_common::types::{
    AssignmentStatus, PayoutMethod, Platform, ReviewStatus, Role, TaskStatus,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Database handle (SQLite).
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn parse_ts(raw: String) -> DateTime<Utc> {
    raw.parse().unwrap_or_else(|_| Utc::now())
}

#[derive(Debug, Clone)]
pub struct NewSocialAccount {
    pub platform: Platform,
    pub account_name: String,
    pub account_id: String,
    pub follower_count: i64,
}

/// Activity-log entry written in the same transaction as the event it
/// describes.
#[derive(Debug, Clone)]
pub struct NewActivity<'a> {
    pub user_id: i64,
    pub action_type: &'a str,
    pub title: &'a str,
    pub detail: Option<&'a str>,
}

fn insert_activity_row(
    conn: &Connection,
    activity: &NewActivity<'_>,
    ts: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO activity_logs (user_id, action_type, title, detail, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            activity.user_id,
            activity.action_type,
            activity.title,
            activity.detail,
            ts
        ],
    )?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub follower_total: i64,
    pub avg_views: i64,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub review_status: ReviewStatus,
    pub review_reason: Option<String>,
    pub follower_total: i64,
    pub avg_views: i64,
    pub weight: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub platform: String,
    pub base_reward_cents: i64,
    pub accept_limit: Option<i64>,
    pub instructions: String,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub platform: String,
    pub base_reward_cents: i64,
    pub accept_limit: Option<i64>,
    pub instructions: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentRecord {
    pub id: i64,
    pub task_id: i64,
    pub user_id: i64,
    pub status: AssignmentStatus,
    pub post_link: Option<String>,
    pub revenue_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementRecordRead {
    pub id: i64,
    pub user_id: i64,
    pub amount_cents: i64,
    pub note: Option<String>,
    /// Admin who recorded the payout. Nullable while the API runs
    /// admin-trusted without authentication.
    pub admin_id: Option<i64>,
    pub paid_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayoutInfoRead {
    pub user_id: i64,
    pub method: PayoutMethod,
    pub account_name: String,
    pub account_no: String,
    pub note: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityRead {
    pub id: i64,
    pub user_id: i64,
    pub action_type: String,
    pub title: String,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletedAssignmentRead {
    pub assignment_id: i64,
    pub task_id: i64,
    pub task_title: String,
    pub platform: String,
    pub revenue_cents: i64,
    pub post_link: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl Database {
    /// Open or create the database at the given path.
    /// Use ":memory:" for in-memory (tests).
    pub fn open(path: &str) -> Result<Self, ServerError> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate_sync()?;
        Ok(db)
    }

    fn migrate_sync(&self) -> Result<(), ServerError> {
        // Startup is single-threaded; blocking on the lock here is fine.
        let conn = self.conn.try_lock().map_err(|_| {
            ServerError::Database("could not lock database for migration".to_string())
        })?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                display_name TEXT,
                phone TEXT,
                city TEXT,
                role TEXT NOT NULL DEFAULT 'blogger',
                is_active INTEGER NOT NULL DEFAULT 1,
                review_status TEXT NOT NULL DEFAULT 'pending',
                review_reason TEXT,
                reviewed_at TEXT,
                follower_total INTEGER NOT NULL DEFAULT 0,
                avg_views INTEGER NOT NULL DEFAULT 0,
                weight REAL NOT NULL DEFAULT 1.0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS social_accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                platform TEXT NOT NULL,
                account_name TEXT NOT NULL,
                account_id TEXT NOT NULL,
                follower_count INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_social_accounts_user
                ON social_accounts (user_id, platform);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_social_accounts_unique
                ON social_accounts (user_id, platform, account_id);

            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                platform TEXT NOT NULL,
                base_reward_cents INTEGER NOT NULL DEFAULT 0,
                accept_limit INTEGER,
                instructions TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'draft',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS assignments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'accepted',
                post_link TEXT,
                revenue_cents INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_assignments_task
                ON assignments (task_id, user_id);
            CREATE INDEX IF NOT EXISTS idx_assignments_user
                ON assignments (user_id, status);

            CREATE TABLE IF NOT EXISTS settlement_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                amount_cents INTEGER NOT NULL,
                note TEXT,
                admin_id INTEGER,
                paid_at TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_settlement_records_user
                ON settlement_records (user_id, paid_at);

            CREATE TABLE IF NOT EXISTS payout_infos (
                user_id INTEGER PRIMARY KEY,
                method TEXT NOT NULL,
                account_name TEXT NOT NULL DEFAULT '',
                account_no TEXT NOT NULL DEFAULT '',
                note TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS activity_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                action_type TEXT NOT NULL,
                title TEXT NOT NULL,
                detail TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_activity_logs_user
                ON activity_logs (user_id, created_at);

            CREATE TABLE IF NOT EXISTS platform_metric_configs (
                platform TEXT PRIMARY KEY,
                platform_coef REAL NOT NULL,
                like_weight REAL NOT NULL,
                favorite_weight REAL NOT NULL,
                share_weight REAL NOT NULL,
                view_weight REAL NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )?;

        info!("database migrated");
        Ok(())
    }

    // --- Users ---

    /// Insert a user and their social accounts in one transaction; a
    /// failing account insert rolls back the user row as well.
    pub async fn create_user(
        &self,
        user: &NewUser,
        accounts: &[NewSocialAccount],
    ) -> Result<i64, ServerError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let ts = now();
        tx.execute(
            "INSERT INTO users (username, display_name, phone, city, follower_total, avg_views, weight, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                user.username,
                user.display_name,
                user.phone,
                user.city,
                user.follower_total,
                user.avg_views,
                user.weight,
                ts,
            ],
        )?;
        let user_id = tx.last_insert_rowid();

        for account in accounts {
            tx.execute(
                "INSERT INTO social_accounts (user_id, platform, account_name, account_id, follower_count)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user_id,
                    account.platform.as_str(),
                    account.account_name,
                    account.account_id,
                    account.follower_count,
                ],
            )?;
        }

        tx.commit()?;
        Ok(user_id)
    }

    fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
        let role: String = row.get(5)?;
        let review: String = row.get(7)?;
        Ok(UserRecord {
            id: row.get(0)?,
            username: row.get(1)?,
            display_name: row.get(2)?,
            phone: row.get(3)?,
            city: row.get(4)?,
            role: if role == "admin" { Role::Admin } else { Role::Blogger },
            is_active: row.get::<_, i64>(6)? != 0,
            review_status: ReviewStatus::from_str(&review).unwrap_or(ReviewStatus::Pending),
            review_reason: row.get(8)?,
            follower_total: row.get(9)?,
            avg_views: row.get(10)?,
            weight: row.get(11)?,
            created_at: parse_ts(row.get(12)?),
            updated_at: parse_ts(row.get(13)?),
        })
    }

    const USER_COLUMNS: &'static str = "id, username, display_name, phone, city, role, is_active, \
         review_status, review_reason, follower_total, avg_views, weight, created_at, updated_at";

    pub async fn list_users(&self) -> Result<Vec<UserRecord>, ServerError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users ORDER BY id",
            Self::USER_COLUMNS
        ))?;
        let rows = stmt
            .query_map([], Self::user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<UserRecord>, ServerError> {
        let conn = self.conn.lock().await;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", Self::USER_COLUMNS),
                params![user_id],
                Self::user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub async fn update_review_status(
        &self,
        user_id: i64,
        status: ReviewStatus,
        reason: Option<&str>,
    ) -> Result<(), ServerError> {
        let conn = self.conn.lock().await;
        let ts = now();
        conn.execute(
            "UPDATE users SET review_status = ?2, review_reason = ?3, reviewed_at = ?4, updated_at = ?4
             WHERE id = ?1",
            params![user_id, status.as_str(), reason, ts],
        )?;
        Ok(())
    }

    pub async fn update_weight(&self, user_id: i64, weight: f64) -> Result<(), ServerError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE users SET weight = ?2, updated_at = ?3 WHERE id = ?1",
            params![user_id, weight, now()],
        )?;
        Ok(())
    }

    /// Eligible pool: active approved bloggers with at least one account on
    /// the platform. `None` skips the platform filter (tasks with an
    /// unrecognized platform tag fall back to the full approved pool).
    /// Ranking is applied by the caller.
    pub async fn eligible_bloggers(
        &self,
        platform: Option<Platform>,
    ) -> Result<Vec<BloggerProfile>, ServerError> {
        let conn = self.conn.lock().await;
        let base = "SELECT u.id, u.username, u.display_name, u.follower_total, u.avg_views, u.weight
             FROM users u
             WHERE u.role = 'blogger' AND u.is_active = 1 AND u.review_status = 'approved'";

        let map = |row: &Row<'_>| -> rusqlite::Result<BloggerProfile> {
            Ok(BloggerProfile {
                user_id: row.get(0)?,
                username: row.get(1)?,
                display_name: row.get(2)?,
                follower_total: row.get(3)?,
                avg_views: row.get(4)?,
                weight: row.get(5)?,
            })
        };

        let rows = match platform {
            Some(platform) => {
                let sql = format!(
                    "{base} AND EXISTS (SELECT 1 FROM social_accounts a
                                        WHERE a.user_id = u.id AND a.platform = ?1)"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![platform.as_str()], map)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(base)?;
                let rows = stmt.query_map([], map)?.collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(rows)
    }

    // --- Tasks ---

    fn task_from_row(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
        let status: String = row.get(7)?;
        Ok(TaskRecord {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            platform: row.get(3)?,
            base_reward_cents: row.get(4)?,
            accept_limit: row.get(5)?,
            instructions: row.get(6)?,
            status: TaskStatus::from_str(&status).unwrap_or(TaskStatus::Draft),
            created_at: parse_ts(row.get(8)?),
            updated_at: parse_ts(row.get(9)?),
        })
    }

    const TASK_COLUMNS: &'static str = "id, title, description, platform, base_reward_cents, \
         accept_limit, instructions, status, created_at, updated_at";

    pub async fn create_task(&self, task: &NewTask) -> Result<i64, ServerError> {
        let conn = self.conn.lock().await;
        let ts = now();
        conn.execute(
            "INSERT INTO tasks (title, description, platform, base_reward_cents, accept_limit, instructions, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                task.title,
                task.description,
                task.platform,
                task.base_reward_cents,
                task.accept_limit,
                task.instructions,
                task.status.as_str(),
                ts,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub async fn get_task(&self, task_id: i64) -> Result<Option<TaskRecord>, ServerError> {
        let conn = self.conn.lock().await;
        let task = conn
            .query_row(
                &format!("SELECT {} FROM tasks WHERE id = ?1", Self::TASK_COLUMNS),
                params![task_id],
                Self::task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    pub async fn list_tasks(
        &self,
        status: Option<TaskStatus>,
    ) -> Result<Vec<TaskRecord>, ServerError> {
        let conn = self.conn.lock().await;
        let rows = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {} FROM tasks WHERE status = ?1 ORDER BY created_at DESC, id DESC",
                    Self::TASK_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![status.as_str()], Self::task_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM tasks ORDER BY created_at DESC, id DESC",
                    Self::TASK_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], Self::task_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(rows)
    }

    pub async fn set_task_status(
        &self,
        task_id: i64,
        status: TaskStatus,
    ) -> Result<bool, ServerError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE tasks SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![task_id, status.as_str(), now()],
        )?;
        Ok(changed > 0)
    }

    pub async fn task_accepted_count(&self, task_id: i64) -> Result<i64, ServerError> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM assignments WHERE task_id = ?1 AND status != 'cancelled'",
            params![task_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // --- Assignments ---

    /// Assign a task to the given users, skipping those who already hold an
    /// active assignment. All assignments and their activity entries commit
    /// in one transaction; any failure leaves nothing behind.
    pub async fn distribute_assignments(
        &self,
        task_id: i64,
        user_ids: &[i64],
        action_type: &str,
        activity_title: &str,
        activity_detail: &str,
    ) -> Result<(u32, u32), ServerError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let ts = now();

        let mut created = 0u32;
        let mut skipped = 0u32;
        for &user_id in user_ids {
            let active: i64 = tx.query_row(
                "SELECT COUNT(*) FROM assignments
                 WHERE task_id = ?1 AND user_id = ?2 AND status != 'cancelled'",
                params![task_id, user_id],
                |row| row.get(0),
            )?;
            if active > 0 {
                skipped += 1;
                continue;
            }

            tx.execute(
                "INSERT INTO assignments (task_id, user_id, status, created_at, updated_at)
                 VALUES (?1, ?2, 'accepted', ?3, ?3)",
                params![task_id, user_id, ts],
            )?;
            insert_activity_row(
                &tx,
                &NewActivity {
                    user_id,
                    action_type,
                    title: activity_title,
                    detail: Some(activity_detail),
                },
                &ts,
            )?;
            created += 1;
        }

        tx.commit()?;
        Ok((created, skipped))
    }

    pub async fn get_assignment(
        &self,
        assignment_id: i64,
    ) -> Result<Option<AssignmentRecord>, ServerError> {
        let conn = self.conn.lock().await;
        let assignment = conn
            .query_row(
                "SELECT id, task_id, user_id, status, post_link, revenue_cents, created_at, updated_at
                 FROM assignments WHERE id = ?1",
                params![assignment_id],
                |row| {
                    let status: String = row.get(3)?;
                    Ok(AssignmentRecord {
                        id: row.get(0)?,
                        task_id: row.get(1)?,
                        user_id: row.get(2)?,
                        status: AssignmentStatus::from_str(&status)
                            .unwrap_or(AssignmentStatus::Accepted),
                        post_link: row.get(4)?,
                        revenue_cents: row.get(5)?,
                        created_at: parse_ts(row.get(6)?),
                        updated_at: parse_ts(row.get(7)?),
                    })
                },
            )
            .optional()?;
        Ok(assignment)
    }

    /// Mark an assignment completed and log the activity atomically.
    pub async fn complete_assignment(
        &self,
        assignment_id: i64,
        revenue_cents: i64,
        post_link: Option<&str>,
        activity: &NewActivity<'_>,
    ) -> Result<(), ServerError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let ts = now();
        tx.execute(
            "UPDATE assignments SET status = 'completed', revenue_cents = ?2,
                 post_link = COALESCE(?3, post_link), updated_at = ?4
             WHERE id = ?1",
            params![assignment_id, revenue_cents, post_link, ts],
        )?;
        insert_activity_row(&tx, activity, &ts)?;
        tx.commit()?;
        Ok(())
    }

    pub async fn recent_completed_assignments(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<CompletedAssignmentRead>, ServerError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT a.id, a.task_id, t.title, t.platform, a.revenue_cents, a.post_link, a.updated_at
             FROM assignments a JOIN tasks t ON t.id = a.task_id
             WHERE a.user_id = ?1 AND a.status = 'completed'
             ORDER BY a.updated_at DESC, a.id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![user_id, limit], |row| {
                Ok(CompletedAssignmentRead {
                    assignment_id: row.get(0)?,
                    task_id: row.get(1)?,
                    task_title: row.get(2)?,
                    platform: row.get(3)?,
                    revenue_cents: row.get(4)?,
                    post_link: row.get(5)?,
                    completed_at: parse_ts(row.get(6)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // --- Settlements ---

    const BALANCE_SQL: &'static str = "SELECT u.id, u.username, u.display_name, u.phone, u.city, u.review_status,
                p.method, p.account_no,
                (SELECT COALESCE(SUM(a.revenue_cents), 0) FROM assignments a
                 WHERE a.user_id = u.id AND a.status = 'completed'),
                (SELECT COALESCE(SUM(r.amount_cents), 0) FROM settlement_records r
                 WHERE r.user_id = u.id),
                (SELECT MAX(r.paid_at) FROM settlement_records r WHERE r.user_id = u.id)
             FROM users u
             LEFT JOIN payout_infos p ON p.user_id = u.id
             WHERE u.role = 'blogger' AND u.is_active = 1";

    fn balance_from_row(row: &Row<'_>) -> rusqlite::Result<BloggerBalance> {
        let review: String = row.get(5)?;
        let method: Option<String> = row.get(6)?;
        let account_no: Option<String> = row.get(7)?;
        Ok(BloggerBalance {
            user_id: row.get(0)?,
            username: row.get(1)?,
            display_name: row.get(2)?,
            phone: row.get(3)?,
            city: row.get(4)?,
            review_status: ReviewStatus::from_str(&review).unwrap_or(ReviewStatus::Pending),
            preferred_method: method.as_deref().and_then(PayoutMethod::from_str),
            has_valid_payout_info: account_no.is_some_and(|no| !no.is_empty()),
            total_revenue_cents: row.get(8)?,
            total_settled_cents: row.get(9)?,
            last_paid_at: row.get::<_, Option<String>>(10)?.map(parse_ts),
        })
    }

    pub async fn blogger_balances(&self) -> Result<Vec<BloggerBalance>, ServerError> {
        let conn = self.conn.lock().await;
        let sql = format!("{} ORDER BY u.id", Self::BALANCE_SQL);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], Self::balance_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub async fn blogger_balance(
        &self,
        user_id: i64,
    ) -> Result<Option<BloggerBalance>, ServerError> {
        let conn = self.conn.lock().await;
        let sql = format!("{} AND u.id = ?1", Self::BALANCE_SQL);
        let balance = conn
            .query_row(&sql, params![user_id], Self::balance_from_row)
            .optional()?;
        Ok(balance)
    }

    /// Append a payout record and its activity entry in one transaction.
    pub async fn insert_settlement_record(
        &self,
        user_id: i64,
        amount_cents: i64,
        note: Option<&str>,
        admin_id: Option<i64>,
        activity: &NewActivity<'_>,
    ) -> Result<SettlementRecordRead, ServerError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let ts = now();
        tx.execute(
            "INSERT INTO settlement_records (user_id, amount_cents, note, admin_id, paid_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![user_id, amount_cents, note, admin_id, ts],
        )?;
        let id = tx.last_insert_rowid();
        insert_activity_row(&tx, activity, &ts)?;
        tx.commit()?;

        Ok(SettlementRecordRead {
            id,
            user_id,
            amount_cents,
            note: note.map(str::to_string),
            admin_id,
            paid_at: parse_ts(ts.clone()),
            created_at: parse_ts(ts),
        })
    }

    pub async fn recent_settlement_records(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<SettlementRecordRead>, ServerError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, amount_cents, note, admin_id, paid_at, created_at
             FROM settlement_records WHERE user_id = ?1
             ORDER BY paid_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![user_id, limit], |row| {
                Ok(SettlementRecordRead {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    amount_cents: row.get(2)?,
                    note: row.get(3)?,
                    admin_id: row.get(4)?,
                    paid_at: parse_ts(row.get(5)?),
                    created_at: parse_ts(row.get(6)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub async fn upsert_payout_info(
        &self,
        user_id: i64,
        method: PayoutMethod,
        account_name: &str,
        account_no: &str,
        note: Option<&str>,
    ) -> Result<(), ServerError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO payout_infos (user_id, method, account_name, account_no, note, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![user_id, method.as_str(), account_name, account_no, note, now()],
        )?;
        Ok(())
    }

    pub async fn get_payout_info(
        &self,
        user_id: i64,
    ) -> Result<Option<PayoutInfoRead>, ServerError> {
        let conn = self.conn.lock().await;
        let info = conn
            .query_row(
                "SELECT user_id, method, account_name, account_no, note, updated_at
                 FROM payout_infos WHERE user_id = ?1",
                params![user_id],
                |row| {
                    let method: String = row.get(1)?;
                    Ok(PayoutInfoRead {
                        user_id: row.get(0)?,
                        method: PayoutMethod::from_str(&method).unwrap_or(PayoutMethod::Other),
                        account_name: row.get(2)?,
                        account_no: row.get(3)?,
                        note: row.get(4)?,
                        updated_at: parse_ts(row.get(5)?),
                    })
                },
            )
            .optional()?;
        Ok(info)
    }

    // --- Activity log ---

    pub async fn recent_activities(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<ActivityRead>, ServerError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, action_type, title, detail, created_at
             FROM activity_logs WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![user_id, limit], |row| {
                Ok(ActivityRead {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    action_type: row.get(2)?,
                    title: row.get(3)?,
                    detail: row.get(4)?,
                    created_at: parse_ts(row.get(5)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // --- Platform metric configs ---

    pub async fn upsert_platform_config(
        &self,
        platform: &str,
        config: &RevenueConfig,
    ) -> Result<(), ServerError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO platform_metric_configs
                 (platform, platform_coef, like_weight, favorite_weight, share_weight, view_weight, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                platform,
                config.platform_coef,
                config.like_weight,
                config.favorite_weight,
                config.share_weight,
                config.view_weight,
                now(),
            ],
        )?;
        Ok(())
    }

    /// Per-platform revenue config, falling back to the `default` row, then
    /// to built-in defaults.
    pub async fn revenue_config(&self, platform: &str) -> Result<RevenueConfig, ServerError> {
        let conn = self.conn.lock().await;
        for key in [platform, "default"] {
            let config = conn
                .query_row(
                    "SELECT platform_coef, like_weight, favorite_weight, share_weight, view_weight
                     FROM platform_metric_configs WHERE platform = ?1",
                    params![key],
                    |row| {
                        Ok(RevenueConfig {
                            platform_coef: row.get(0)?,
                            like_weight: row.get(1)?,
                            favorite_weight: row.get(2)?,
                            share_weight: row.get(3)?,
                            view_weight: row.get(4)?,
                        })
                    },
                )
                .optional()?;
            if let Some(config) = config {
                return Ok(config);
            }
        }
        Ok(RevenueConfig::default())
    }

    pub async fn list_platform_configs(
        &self,
    ) -> Result<Vec<(String, RevenueConfig)>, ServerError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT platform, platform_coef, like_weight, favorite_weight, share_weight, view_weight
             FROM platform_metric_configs ORDER BY platform",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    RevenueConfig {
                        platform_coef: row.get(1)?,
                        like_weight: row.get(2)?,
                        favorite_weight: row.get(3)?,
                        share_weight: row.get(4)?,
                        view_weight: row.get(5)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
