use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

/// Read an optional env var, treating empty values as unset.
pub fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

/// Read an env var with a default fallback.
pub fn env_or(key: &str, default: &str) -> String {
    optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an env var into the target type, with a default.
pub fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    optional_env(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse a listen address from env.
pub fn listen_addr(key: &str, default: &str) -> SocketAddr {
    env_or(key, default)
        .parse()
        .expect("invalid listen address")
}
