use std::time::Duration;

/// Messenger API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string. `None` selects the in-memory repository.
    pub database_url: Option<String>,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Capacity of each broadcast queue (root messages and replies).
    pub broadcast_queue_capacity: usize,
    /// Deadline for a single write to a client socket.
    pub write_timeout: Duration,
    /// Optional deadline for a client to send its next frame.
    pub read_idle_timeout: Option<Duration>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable is optional; malformed values fall back to defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            port: parsed_var("PORT").unwrap_or(8440),
            broadcast_queue_capacity: parsed_var::<usize>("BROADCAST_QUEUE_CAPACITY")
                .unwrap_or(256)
                .max(1),
            write_timeout: Duration::from_secs(parsed_var("WRITE_TIMEOUT_SECS").unwrap_or(10)),
            read_idle_timeout: parsed_var("READ_IDLE_TIMEOUT_SECS").map(Duration::from_secs),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            port: 8440,
            broadcast_queue_capacity: 256,
            write_timeout: Duration::from_secs(10),
            read_idle_timeout: None,
        }
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Read a variable that must be present, panicking with a descriptive message.
pub fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}
