/// URL for accessing the PostgreSQL database (should contain a schema name in the path)
pub const DB_URL: &str = "DATABASE_URL";
/// Log level configuration for the application. Accepts `tracing_subscriber::EnvFilter`
/// directives, e.g. `info,tasktrack=debug`
pub const LOG_LEVEL: &str = "LOG_LEVEL";
/// TCP port the HTTP server binds to. Defaults to 4000 when unset.
pub const SERVER_PORT: &str = "SERVER_PORT";
