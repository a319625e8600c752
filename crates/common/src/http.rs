use reqwest::{Client, ClientBuilder};
use std::time::Duration;

/// Build a standard HTTP client with reasonable defaults.
pub fn build_client() -> Client {
    ClientBuilder::new()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(4)
        .build()
        .expect("failed to build HTTP client")
}
