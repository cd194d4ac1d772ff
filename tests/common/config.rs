//! Configurations tuned for fast local runs

use batch_uploader::Config;
use std::path::Path;
use std::time::Duration;

/// Short pauses, scratch space under `dir`, no probe endpoints
///
/// Reachability falls back to resolving `localhost`, so runs need no outside
/// network. Tests that need the HTTP probe or the archive point them at a mock
/// server.
pub fn fast_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.credentials.username = "e2e-bot".to_string();
    config.credentials.password = "hunter2".to_string();
    config.upload.parallelism = 2;
    config.upload.max_attempts = 3;
    config.upload.retry_pause = Duration::from_millis(10);
    config.upload.shutdown_grace = Duration::from_millis(300);
    config.acquire.temp_dir = dir.join("scratch");
    config.acquire.download_attempts = 2;
    config.acquire.download_pause = Duration::from_millis(5);
    config.acquire.request_timeout = Duration::from_secs(5);
    config.acquire.use_archive = false;
    config.network.probe_endpoints = Vec::new();
    config.network.dns_host = "localhost".to_string();
    config.network.poll_interval = Duration::from_millis(10);
    config.network.probe_timeout = Duration::from_secs(2);
    config
}

/// [`fast_config`] with probes and the archive served by `base_url`
pub fn mocked_config(dir: &Path, base_url: &str) -> Config {
    let mut config = fast_config(dir);
    config.network.probe_endpoints = vec![format!("{}/ping", base_url)];
    config.network.dns_host = String::new();
    config.acquire.use_archive = true;
    config.acquire.archive_base_url = base_url.to_string();
    config
}
