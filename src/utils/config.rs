use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub data: PathBuf,
    pub defaults: PathBuf,
    pub port: u16,
    pub meta_threads: usize,
    pub refresh_debounce: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let data = env::var("DASHBOARD_DATA").unwrap_or_else(|_| "data".to_string());
        let defaults = env::var("DASHBOARD_DEFAULTS").unwrap_or_else(|_| "defaults".to_string());
        let port = env::var("DASHBOARD_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(3000);
        let meta_threads = env::var("DASHBOARD_META_THREADS").ok().and_then(|v| v.parse().ok()).filter(|n| *n > 0).unwrap_or(2);
        let debounce_ms = env::var("DASHBOARD_REFRESH_DEBOUNCE_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(500);
        Self {
            data: PathBuf::from(data),
            defaults: PathBuf::from(defaults),
            port,
            meta_threads,
            refresh_debounce: Duration::from_millis(debounce_ms),
        }
    }

    /// Local media lives under `<data>/backgrounds`.
    pub fn media_root(&self) -> PathBuf {
        self.data.join("backgrounds")
    }

    /// First-run template for the config document.
    pub fn defaults_file(&self) -> PathBuf {
        self.defaults.join("config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::{const_mutex, Mutex};

    // env is process-wide; tests touching it take turns
    static ENV_LOCK: Mutex<()> = const_mutex(());

    const VARS: &[&str] = &[
        "DASHBOARD_DATA",
        "DASHBOARD_DEFAULTS",
        "DASHBOARD_PORT",
        "DASHBOARD_META_THREADS",
        "DASHBOARD_REFRESH_DEBOUNCE_MS",
    ];

    fn clear_vars(vars: &[&str]) -> Vec<(String, Option<String>)> {
        let mut saved = Vec::new();
        for &k in vars {
            let prev = env::var(k).ok();
            saved.push((k.to_string(), prev));
            env::remove_var(k);
        }
        saved
    }

    fn restore_vars(saved: Vec<(String, Option<String>)>) {
        for (k, v) in saved {
            if let Some(val) = v {
                env::set_var(k, val);
            } else {
                env::remove_var(k);
            }
        }
    }

    #[test]
    fn test_config_defaults() {
        let _env = ENV_LOCK.lock();
        let saved = clear_vars(VARS);

        let config = Config::from_env();
        assert_eq!(config.data, PathBuf::from("data"));
        assert_eq!(config.port, 3000);
        assert_eq!(config.meta_threads, 2);
        assert_eq!(config.refresh_debounce, Duration::from_millis(500));
        assert_eq!(config.media_root(), PathBuf::from("data/backgrounds"));
        assert_eq!(config.defaults_file(), PathBuf::from("defaults/config.json"));

        restore_vars(saved);
    }

    #[test]
    fn test_config_from_env() {
        let _env = ENV_LOCK.lock();
        let saved = clear_vars(VARS);

        env::set_var("DASHBOARD_DATA", "/srv/dashboard");
        env::set_var("DASHBOARD_DEFAULTS", "/usr/share/dashboard");
        env::set_var("DASHBOARD_PORT", "8080");
        env::set_var("DASHBOARD_META_THREADS", "4");
        env::set_var("DASHBOARD_REFRESH_DEBOUNCE_MS", "50");

        let config = Config::from_env();
        assert_eq!(config.media_root(), PathBuf::from("/srv/dashboard/backgrounds"));
        assert_eq!(config.defaults_file(), PathBuf::from("/usr/share/dashboard/config.json"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.meta_threads, 4);
        assert_eq!(config.refresh_debounce, Duration::from_millis(50));

        restore_vars(saved);
    }

    #[test]
    fn test_config_rejects_garbage() {
        let _env = ENV_LOCK.lock();
        let saved = clear_vars(VARS);
        env::set_var("DASHBOARD_PORT", "not-a-port");
        env::set_var("DASHBOARD_META_THREADS", "0");
        let config = Config::from_env();
        assert_eq!(config.port, 3000);
        assert_eq!(config.meta_threads, 2);
        restore_vars(saved);
    }
}
