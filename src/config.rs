#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Database connection string.
    pub database_url: String,

    /// Address the HTTP API binds to.
    pub bind_addr: String,

    /// Directory holding the bootstrap CSV files
    /// (`sample_data.csv`, `blocked_paths.csv`).
    pub data_dir: String,

    /// Origins allowed by CORS, comma separated. Empty means "any",
    /// which is only acceptable for local development.
    pub allowed_origins: Vec<String>,

    // =========================
    // Fleet configuration
    // =========================
    /// Number of bots created at bootstrap.
    pub total_bots: u32,

    /// Maximum active orders (ASSIGNED or PICKED_UP) a bot may carry.
    pub bot_max_capacity: u32,

    /// Coordinates of the central station node. Idle bots drift back
    /// here, and reset returns the whole fleet here.
    pub station_x: i64,
    pub station_y: i64,

    // =========================
    // Order intake configuration
    // =========================
    /// Maximum orders admitted per restaurant within one window.
    /// Shared by both window variants below.
    pub restaurant_order_limit: usize,

    /// Wall-clock window (seconds) used on the order-creation path.
    pub restaurant_window_secs: u64,

    /// Tick-count window used by the in-tick assignment planner.
    pub restaurant_window_ticks: u64,

    // =========================
    // Simulation driver
    // =========================
    /// Cadence of the background tick loop, in milliseconds.
    /// 0 disables the loop; ticks then only happen through the manual
    /// step endpoint.
    pub tick_interval_ms: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://gridbite_dev.db".to_string());

        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());

        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string());

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            database_url,
            bind_addr,
            data_dir,
            allowed_origins,

            // Fleet defaults: 5 bots carrying up to 3 orders each,
            // stationed at (4,3).
            total_bots: env_u64("TOTAL_BOTS", 5) as u32,
            bot_max_capacity: env_u64("BOT_MAX_CAPACITY", 3) as u32,
            station_x: env_u64("STATION_X", 4) as i64,
            station_y: env_u64("STATION_Y", 3) as i64,

            // Intake defaults: 3 orders per restaurant per 30s / 30 ticks.
            restaurant_order_limit: env_u64("RESTAURANT_ORDER_LIMIT", 3) as usize,
            restaurant_window_secs: env_u64("RESTAURANT_WINDOW_SECS", 30),
            restaurant_window_ticks: env_u64("RESTAURANT_WINDOW_TICKS", 30),

            tick_interval_ms: env_u64("TICK_INTERVAL_MS", 1_000),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
