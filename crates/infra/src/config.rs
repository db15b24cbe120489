//! Infrastructure configuration from environment variables.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `REDIS_URL` | unset | Pub/sub broker; unset selects the in-process hub |
//! | `DATABASE_URL` | unset | Postgres for the event log and registry; unset selects memory |
//! | `DATABASE_MAX_CONNECTIONS` | `10` | Pool size |

/// Default Postgres pool size.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfraConfig {
    pub redis_url: Option<String>,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
}

impl Default for InfraConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            database_url: None,
            database_max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
        }
    }
}

impl InfraConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup` (environment-like key/value source).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            redis_url: non_empty(lookup("REDIS_URL")),
            database_url: non_empty(lookup("DATABASE_URL")),
            database_max_connections: parse_or(
                lookup("DATABASE_MAX_CONNECTIONS"),
                DEFAULT_DATABASE_MAX_CONNECTIONS,
            ),
        }
    }
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse `value`, falling back to `default` when unset or malformed.
pub fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
