//! Process settings read from the environment (and `.env`).

/// Environment-level settings: logging, Redis location and config path.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub env: String,
    pub log_level: String,
    pub config_path: String,
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_db: u32,
    pub redis_password: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            env: "development".to_string(),
            log_level: "info".to_string(),
            config_path: "config.yaml".to_string(),
            redis_host: "localhost".to_string(),
            redis_port: 6379,
            redis_db: 0,
            redis_password: None,
        }
    }
}

impl Settings {
    /// Load from environment variables (ENV, LOG_LEVEL, CONFIG_PATH, REDIS_*).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable numbers keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            env: lookup("ENV").unwrap_or(defaults.env),
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
            config_path: lookup("CONFIG_PATH").unwrap_or(defaults.config_path),
            redis_host: lookup("REDIS_HOST").unwrap_or(defaults.redis_host),
            redis_port: lookup("REDIS_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.redis_port),
            redis_db: lookup("REDIS_DB")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.redis_db),
            redis_password: lookup("REDIS_PASSWORD").filter(|p| !p.is_empty()),
        }
    }

    /// `redis://[:password@]host:port/db`.
    pub fn redis_url(&self) -> String {
        match &self.redis_password {
            Some(password) => format!(
                "redis://:{password}@{}:{}/{}",
                self.redis_host, self.redis_port, self.redis_db
            ),
            None => format!("redis://{}:{}/{}", self.redis_host, self.redis_port, self.redis_db),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn lookup_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            ("REDIS_HOST", "cache"),
            ("REDIS_PORT", "6380"),
            ("REDIS_DB", "not-a-number"),
            ("REDIS_PASSWORD", "s3cret"),
        ]
        .into_iter()
        .collect();
        let settings = Settings::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(settings.redis_port, 6380);
        assert_eq!(settings.redis_db, 0);
        assert_eq!(settings.redis_url(), "redis://:s3cret@cache:6380/0");
        assert_eq!(settings.log_level, "info");
    }
}
