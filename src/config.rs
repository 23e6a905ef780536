use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{LibraryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
	Development,
	Production,
}

impl Environment {
	pub fn is_development(self) -> bool {
		matches!(self, Environment::Development)
	}
}

impl FromStr for Environment {
	type Err = LibraryError;

	fn from_str(s: &str) -> Result<Self> {
		match s.trim().to_ascii_lowercase().as_str() {
			"development" | "dev" => Ok(Environment::Development),
			"production" | "prod" => Ok(Environment::Production),
			other => Err(LibraryError::Config(format!("LIBRARY_ENV: unknown environment '{other}'"))),
		}
	}
}

#[derive(Debug, Clone)]
pub struct Config {
	pub database_url: String,
	pub host: String,
	pub port: u16,
	pub environment: Environment,
	pub max_connections: u32,
	pub request_timeout: Duration,
	pub static_dir: Option<PathBuf>,
	pub seed: bool,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			database_url: "sqlite://library.db".to_string(),
			host: "0.0.0.0".to_string(),
			port: 3001,
			environment: Environment::Development,
			max_connections: 5,
			request_timeout: Duration::from_secs(10),
			static_dir: None,
			seed: false,
		}
	}
}

impl Config {
	/// Reads the process environment; call `dotenvy::dotenv()` first to pick up `.env`.
	pub fn from_env() -> Result<Config> {
		Config::from_lookup(|key| std::env::var(key).ok())
	}

	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config> {
		let defaults = Config::default();
		let timeout_secs: u64 = parse_var(&lookup, "REQUEST_TIMEOUT_SECS")?
			.unwrap_or(defaults.request_timeout.as_secs());

		Ok(Config {
			database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
			host: lookup("HOST").unwrap_or(defaults.host),
			port: parse_var(&lookup, "PORT")?.unwrap_or(defaults.port),
			environment: parse_var(&lookup, "LIBRARY_ENV")?.unwrap_or(defaults.environment),
			max_connections: parse_var(&lookup, "DB_MAX_CONNECTIONS")?.unwrap_or(defaults.max_connections),
			request_timeout: Duration::from_secs(timeout_secs),
			static_dir: lookup("STATIC_DIR").filter(|dir| !dir.is_empty()).map(PathBuf::from),
			seed: parse_var(&lookup, "LIBRARY_SEED")?.unwrap_or(defaults.seed),
		})
	}

	pub fn bind_addr(&self) -> Result<SocketAddr> {
		format!("{}:{}", self.host, self.port)
			.parse()
			.map_err(|e| LibraryError::Config(format!("HOST/PORT: {e}")))
	}
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
	T: FromStr,
	T::Err: std::fmt::Display,
{
	match lookup(key) {
		None => Ok(None),
		Some(raw) if raw.trim().is_empty() => Ok(None),
		Some(raw) => raw.trim()
			.parse()
			.map(Some)
			.map_err(|e| LibraryError::Config(format!("{key}: {e}"))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
		let vars: HashMap<String, String> = pairs.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		Config::from_lookup(|key| vars.get(key).cloned())
	}

	#[test]
	fn defaults_when_unset() {
		let config = config_from(&[]).unwrap();
		assert_eq!(config.port, 3001);
		assert_eq!(config.environment, Environment::Development);
		assert_eq!(config.request_timeout, Duration::from_secs(10));
		assert!(config.static_dir.is_none());
		assert!(!config.seed);
	}

	#[test]
	fn reads_overrides() {
		let config = config_from(&[
			("PORT", "8080"),
			("LIBRARY_ENV", "production"),
			("DATABASE_URL", "sqlite::memory:"),
			("LIBRARY_SEED", "true"),
			("STATIC_DIR", "frontend/build"),
		]).unwrap();
		assert_eq!(config.port, 8080);
		assert_eq!(config.environment, Environment::Production);
		assert_eq!(config.database_url, "sqlite::memory:");
		assert!(config.seed);
		assert_eq!(config.static_dir, Some(PathBuf::from("frontend/build")));
		assert_eq!(config.bind_addr().unwrap().port(), 8080);
	}

	#[test]
	fn rejects_bad_values() {
		let err = config_from(&[("PORT", "eighty")]).unwrap_err();
		assert!(err.to_string().contains("PORT"));
		assert!(config_from(&[("LIBRARY_ENV", "staging")]).is_err());
	}
}
