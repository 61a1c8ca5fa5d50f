use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub supabase_jwt_secret: String,
    pub google_calendar_api_base_url: String,
    pub google_calendar_access_token: String,
    pub calendar_webhook_url: String,
    pub calendar_webhook_token: Option<String>,
    pub practice_timezone: String,
    pub channel_renewal_interval_seconds: u64,
    pub provider_timeout_seconds: u64,
    pub notification_webhook_url: Option<String>,
    pub admin_notification_email: Option<String>,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            google_calendar_api_base_url: env::var("GOOGLE_CALENDAR_API_BASE_URL")
                .unwrap_or_else(|_| "https://www.googleapis.com/calendar/v3".to_string()),
            google_calendar_access_token: env::var("GOOGLE_CALENDAR_ACCESS_TOKEN")
                .unwrap_or_else(|_| {
                    warn!("GOOGLE_CALENDAR_ACCESS_TOKEN not set, using empty value");
                    String::new()
                }),
            calendar_webhook_url: env::var("CALENDAR_WEBHOOK_URL")
                .unwrap_or_else(|_| {
                    warn!("CALENDAR_WEBHOOK_URL not set, push channels cannot be created");
                    String::new()
                }),
            calendar_webhook_token: env::var("CALENDAR_WEBHOOK_TOKEN").ok(),
            practice_timezone: env::var("PRACTICE_TIMEZONE")
                .unwrap_or_else(|_| "UTC".to_string()),
            channel_renewal_interval_seconds: parse_or("CHANNEL_RENEWAL_INTERVAL_SECONDS", 3600),
            provider_timeout_seconds: parse_or("PROVIDER_TIMEOUT_SECONDS", 15),
            notification_webhook_url: env::var("NOTIFICATION_WEBHOOK_URL").ok(),
            admin_notification_email: env::var("ADMIN_NOTIFICATION_EMAIL").ok(),
            server_port: parse_or("SERVER_PORT", 3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        if !config.is_calendar_configured() {
            warn!("Calendar provider not configured - sync and provisioning will fail");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_calendar_configured(&self) -> bool {
        !self.google_calendar_api_base_url.is_empty()
            && !self.google_calendar_access_token.is_empty()
            && !self.calendar_webhook_url.is_empty()
    }

    /// Key used for backend-initiated store access. Falls back to the anon key
    /// when no service role key is configured.
    pub fn store_key(&self) -> &str {
        if self.supabase_service_role_key.is_empty() {
            &self.supabase_anon_key
        } else {
            &self.supabase_service_role_key
        }
    }
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}
