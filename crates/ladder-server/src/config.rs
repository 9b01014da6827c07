use serde::Deserialize;

/// Top-level server configuration, loaded from `ladder.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub web_root: String,
    /// JSON seed for the in-memory store. None = start empty.
    pub seed_path: Option<String>,
    pub auth: AuthFileConfig,
    pub limits: LimitsConfig,
    pub lobbies: LobbiesConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            web_root: "web".to_string(),
            seed_path: None,
            auth: AuthFileConfig::default(),
            limits: LimitsConfig::default(),
            lobbies: LobbiesConfig::default(),
        }
    }
}

/// Transport limits (connection caps, queue sizes, rate limits).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_ws_connections: usize,
    /// Outbound frames queued per connection before it counts as a slow consumer.
    pub connection_buffer: usize,
    pub ws_rate_limit_per_sec: f64,
    /// Seconds a new socket has to send its join/watch frame.
    pub join_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_ws_connections: 500,
            connection_buffer: 256,
            ws_rate_limit_per_sec: 20.0,
            join_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LobbiesConfig {
    pub max_teams_per_lobby: usize,
}

impl Default for LobbiesConfig {
    fn default() -> Self {
        Self {
            max_teams_per_lobby: 10,
        }
    }
}

/// Auth section of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthFileConfig {
    /// Admin token for the admin API and lobby watching. None = admin auth disabled.
    pub admin_token: Option<String>,
}

impl ServerConfig {
    /// Validate configuration, logging warnings for issues.
    pub fn validate(&self) {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            tracing::error!(
                addr = %self.listen_addr,
                "listen_addr is not a valid socket address"
            );
            std::process::exit(1);
        }

        if self.auth.admin_token.is_none() {
            tracing::warn!("No admin token configured; admin API and lobby watching are open");
        }

        if self.limits.max_ws_connections == 0 {
            tracing::error!("limits.max_ws_connections must be > 0");
            std::process::exit(1);
        }
        if self.limits.connection_buffer == 0 {
            tracing::error!("limits.connection_buffer must be > 0");
            std::process::exit(1);
        }
        if self.limits.ws_rate_limit_per_sec <= 0.0 {
            tracing::error!("limits.ws_rate_limit_per_sec must be > 0");
            std::process::exit(1);
        }
        if self.limits.join_timeout_secs == 0 {
            tracing::error!("limits.join_timeout_secs must be > 0");
            std::process::exit(1);
        }
        if self.lobbies.max_teams_per_lobby < 2 {
            tracing::error!("lobbies.max_teams_per_lobby must be >= 2");
            std::process::exit(1);
        }
    }

    /// Load config from `ladder.toml` if it exists, then apply env var overrides.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string("ladder.toml") {
            Ok(content) => match toml::from_str::<ServerConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from ladder.toml");
                    cfg
                },
                Err(e) => {
                    tracing::warn!("Failed to parse ladder.toml: {e}, using defaults");
                    ServerConfig::default()
                },
            },
            Err(_) => {
                tracing::info!("No ladder.toml found, using defaults");
                ServerConfig::default()
            },
        };

        if let Ok(addr) = std::env::var("LADDER_LISTEN_ADDR")
            && !addr.is_empty()
        {
            config.listen_addr = addr;
        }
        if let Ok(root) = std::env::var("LADDER_WEB_ROOT")
            && !root.is_empty()
        {
            config.web_root = root;
        }
        if let Ok(token) = std::env::var("LADDER_ADMIN_TOKEN")
            && !token.is_empty()
        {
            config.auth.admin_token = Some(token);
        }
        if let Ok(path) = std::env::var("LADDER_SEED_PATH")
            && !path.is_empty()
        {
            config.seed_path = Some(path);
        }
        if let Ok(val) = std::env::var("LADDER_MAX_WS_CONNECTIONS")
            && let Ok(n) = val.parse::<usize>()
        {
            config.limits.max_ws_connections = n;
        }
        if let Ok(val) = std::env::var("LADDER_WS_RATE_LIMIT")
            && let Ok(n) = val.parse::<f64>()
        {
            config.limits.ws_rate_limit_per_sec = n;
        }

        config
    }
}
