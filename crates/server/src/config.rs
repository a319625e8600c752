use crate::distribution::ScalePolicy;
use kolflow_common::config::{env_or, env_parse, listen_addr};
use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub db_path: String,
    /// Weight assigned to newly registered bloggers.
    pub default_user_weight: f64,
    pub scale_policy: ScalePolicy,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            listen_addr: listen_addr("LISTEN_ADDR", "0.0.0.0:8080"),
            db_path: env_or("DB_PATH", "kolflow.db"),
            default_user_weight: env_parse("DEFAULT_USER_WEIGHT", 1.0),
            scale_policy: ScalePolicy {
                min_ratio: env_parse("SCALE_MIN_RATIO", ScalePolicy::default().min_ratio),
                max_ratio: env_parse("SCALE_MAX_RATIO", ScalePolicy::default().max_ratio),
            },
        }
    }
}
