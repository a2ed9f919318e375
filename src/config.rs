// Application configuration, loaded from environment variables and CLI flags.

use std::collections::HashSet;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL (SQLite connection string).
    pub database_url: String,
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Static bearer token required on /api routes. Unset means open access.
    pub api_token: Option<String>,
    /// Whether to run in local mode (throttling disabled).
    pub local_mode: bool,
    /// How long a (actor, target, event) key suppresses repeats, in seconds.
    pub dedup_ttl_seconds: u64,
    /// Subjects exempt from every throttle policy.
    pub bypass_ids: HashSet<i64>,
    /// Targets whose negative events bounce back onto the actor.
    pub protected_ids: HashSet<i64>,
    /// Bot accounts; scoring them is rejected.
    pub bot_ids: HashSet<i64>,
    /// Accumulated token cost (in cents) above which the ai action
    /// switches to the strict paid policy.
    pub paid_cost_threshold_cents: i64,
    /// Whether the background decay sweep runs.
    pub decay_enabled: bool,
    /// Seconds between decay sweeps.
    pub decay_interval_seconds: u64,
    /// Seconds of silence after which a user counts as inactive.
    pub decay_inactivity_seconds: i64,
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `DATABASE_URL` - SQLite connection string (default: `sqlite:karma.db?mode=rwc`)
    /// - `PORT` - HTTP server port (default: 3000)
    /// - `API_TOKEN` - static bearer token for /api routes (default: unset)
    /// - `KARMA_LOCAL_MODE` - set to `true` to enable local mode
    /// - `DEDUP_TTL_SECONDS` - duplicate suppression window (default: 60)
    /// - `THROTTLE_BYPASS_IDS` - comma-separated user ids exempt from throttling
    /// - `PROTECTED_IDS` - comma-separated user ids shielded from negative events
    /// - `BOT_IDS` - comma-separated bot account ids
    /// - `PAID_COST_THRESHOLD_CENTS` - paid-ai cutover (default: 200)
    /// - `DECAY_ENABLED` - set to `false` to disable the decay sweep
    /// - `DECAY_INTERVAL_SECONDS` - sweep period (default: 86400)
    /// - `DECAY_INACTIVITY_SECONDS` - inactivity horizon (default: 86400)
    ///
    /// CLI flags:
    /// - `--local` - Enable local mode (same as `KARMA_LOCAL_MODE=true`)
    /// - `--port <PORT>` - Override the port
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:karma.db?mode=rwc".to_string());

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(&args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| std::env::var("PORT").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(3000);

        let api_token = std::env::var("API_TOKEN").ok().filter(|t| !t.is_empty());

        let local_mode = args.contains(&"--local".to_string())
            || std::env::var("KARMA_LOCAL_MODE")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false);

        let dedup_ttl_seconds = Self::parse_env("DEDUP_TTL_SECONDS").unwrap_or(60);

        let bypass_ids = Self::parse_id_list(std::env::var("THROTTLE_BYPASS_IDS").ok());
        let protected_ids = Self::parse_id_list(std::env::var("PROTECTED_IDS").ok());
        let bot_ids = Self::parse_id_list(std::env::var("BOT_IDS").ok());

        let paid_cost_threshold_cents =
            Self::parse_env("PAID_COST_THRESHOLD_CENTS").unwrap_or(200);

        let decay_enabled = std::env::var("DECAY_ENABLED")
            .map(|v| !(v.eq_ignore_ascii_case("false") || v == "0"))
            .unwrap_or(true);
        let decay_interval_seconds = Self::parse_env("DECAY_INTERVAL_SECONDS").unwrap_or(86400);
        let decay_inactivity_seconds =
            Self::parse_env("DECAY_INACTIVITY_SECONDS").unwrap_or(86400);

        Config {
            database_url,
            port,
            api_token,
            local_mode,
            dedup_ttl_seconds,
            bypass_ids,
            protected_ids,
            bot_ids,
            paid_cost_threshold_cents,
            decay_enabled,
            decay_interval_seconds,
            decay_inactivity_seconds,
        }
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }

    fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
        std::env::var(name).ok().and_then(|v| v.parse().ok())
    }

    /// Parse a comma-separated id list; garbage entries are skipped.
    fn parse_id_list(value: Option<String>) -> HashSet<i64> {
        value
            .map(|v| {
                v.split(',')
                    .filter_map(|s| s.trim().parse().ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for Config {
    /// Defaults used by tests; `load()` is the production entry point.
    fn default() -> Self {
        Config {
            database_url: "sqlite::memory:".to_string(),
            port: 3000,
            api_token: None,
            local_mode: false,
            dedup_ttl_seconds: 60,
            bypass_ids: HashSet::new(),
            protected_ids: HashSet::new(),
            bot_ids: HashSet::new(),
            paid_cost_threshold_cents: 200,
            decay_enabled: false,
            decay_interval_seconds: 86400,
            decay_inactivity_seconds: 86400,
        }
    }
}

/// Global flag indicating local mode is active.
/// This is set once at startup and read by the throttle guard.
static LOCAL_MODE: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

/// Set the local mode flag (called once at startup).
pub fn set_local_mode(enabled: bool) {
    LOCAL_MODE.store(enabled, std::sync::atomic::Ordering::Relaxed);
}

/// Check if local mode is active.
pub fn is_local_mode() -> bool {
    LOCAL_MODE.load(std::sync::atomic::Ordering::Relaxed)
}
