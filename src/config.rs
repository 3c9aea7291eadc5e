use std::path::PathBuf;

use serde::Deserialize;

/// Application settings read from the Rocket figment (`Rocket.toml` or
/// `ROCKET_*` variables), alongside Rocket's own keys.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    /// Sessions kept per user; older ones are dropped on login.
    pub max_sessions: i64,
    pub recent_count: usize,
    pub currency_symbol: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/ledger.sqlite"),
            max_sessions: 5,
            recent_count: 5,
            currency_symbol: "₹".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::figment::Figment;
    use rocket::figment::providers::Serialized;

    #[test]
    fn test_defaults_fill_missing_keys() {
        let config: AppConfig = Figment::new()
            .merge(Serialized::default("recent_count", 3))
            .merge(Serialized::default("port", 8000))
            .extract()
            .unwrap();
        assert_eq!(config.recent_count, 3);
        assert_eq!(config.max_sessions, 5);
        assert_eq!(config.database_path, PathBuf::from("data/ledger.sqlite"));
        assert_eq!(config.currency_symbol, "₹");
    }
}
