use serde::Deserialize;
use std::env;

/// SMTP settings for the best-effort completion notification. Absent when
/// the deployment has no mailer configured.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpSettings {
    pub server: String,
    pub port: u16,
    pub use_tls: bool,
    pub login: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
    /// Staff address notified when a submission completes.
    pub notify_email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_database: String,
    pub jwt_secret: String,
    /// Directory respondent uploads are stored in; created on demand.
    pub upload_dir: String,
    /// Base URL the public form links are built against.
    pub public_base_url: String,
    pub smtp: Option<SmtpSettings>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let config_builder = config::Config::builder()
            .add_source(
                config::File::with_name(&format!("config/{}", env)).required(false), // Allow missing config file, fallback to ENV
            )
            // Override with environment variables (prefix: APP_)
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let settings = config_builder.build()?;

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017/eprofos_forms".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "eprofos_forms".to_string());

        let jwt_secret = settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
            .unwrap_or_else(|_| {
                if env == "prod" {
                    panic!("FATAL: JWT_SECRET must be set in production!");
                }
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                "dev-secret-only-for-local-testing".to_string()
            });

        let upload_dir = settings
            .get_string("uploads.dir")
            .or_else(|_| env::var("UPLOAD_DIR"))
            .unwrap_or_else(|_| "var/uploads".to_string());

        let public_base_url = settings
            .get_string("server.public_base_url")
            .or_else(|_| env::var("PUBLIC_BASE_URL"))
            .unwrap_or_else(|_| "http://localhost:8081".to_string());

        let smtp = Self::load_smtp(&settings);

        Ok(Config {
            mongo_uri,
            mongo_database,
            jwt_secret,
            upload_dir,
            public_base_url,
            smtp,
        })
    }

    /// SMTP is optional: a deployment without a configured server simply
    /// skips completion notifications.
    fn load_smtp(settings: &config::Config) -> Option<SmtpSettings> {
        let server = settings
            .get_string("smtp.server")
            .or_else(|_| env::var("SMTP_SERVER"))
            .ok()?;

        let port = settings
            .get_string("smtp.port")
            .or_else(|_| env::var("SMTP_PORT"))
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(587);

        let use_tls = settings
            .get_string("smtp.use_tls")
            .or_else(|_| env::var("SMTP_USE_TLS"))
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(true);

        let login = settings
            .get_string("smtp.login")
            .or_else(|_| env::var("SMTP_LOGIN"))
            .unwrap_or_default();

        let password = settings
            .get_string("smtp.password")
            .or_else(|_| env::var("SMTP_PASSWORD"))
            .unwrap_or_default();

        let from_email = settings
            .get_string("smtp.from_email")
            .or_else(|_| env::var("SMTP_FROM_EMAIL"))
            .unwrap_or_else(|_| "noreply@eprofos.example".to_string());

        let from_name = settings
            .get_string("smtp.from_name")
            .or_else(|_| env::var("SMTP_FROM_NAME"))
            .unwrap_or_else(|_| "EPROFOS".to_string());

        let notify_email = settings
            .get_string("smtp.notify_email")
            .or_else(|_| env::var("SMTP_NOTIFY_EMAIL"))
            .ok()?;

        Some(SmtpSettings {
            server,
            port,
            use_tls,
            login,
            password,
            from_email,
            from_name,
            notify_email,
        })
    }
}
