use std::time::Duration;

/// Runtime settings for `Server`. Everything beyond the bind address is an
/// opt-in hardening knob; the defaults reproduce the plain trust-the-client
/// upsert protocol with no eviction.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on, e.g. "127.0.0.1:8080"
    pub addr: String,
    /// Cap on concurrent connections
    pub max_clients: Option<usize>,
    /// Players not heard from for this long are evicted
    pub player_ttl: Option<Duration>,
    /// How often the eviction sweeper runs when `player_ttl` is set
    pub sweep_interval: Duration,
    /// Bind identities to connections and refuse mismatches
    pub strict_sessions: bool,
    /// Remove a connection's player when the connection closes
    pub evict_on_disconnect: bool,
}

impl ServerConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Self::default()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            max_clients: None,
            player_ttl: None,
            sweep_interval: Duration::from_secs(1),
            strict_sessions: false,
            evict_on_disconnect: false,
        }
    }
}
