use std::sync::Once;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Filter variable consulted before `RUST_LOG`
pub const LOG_ENV: &str = "MOTIONCAM_LOG";

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    /// JSON in production, compact human-readable lines otherwise
    pub fn for_environment(env: &str) -> Self {
        if env.eq_ignore_ascii_case("production") {
            LogFormat::Json
        } else {
            LogFormat::Compact
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize tracing - safe to call multiple times
pub fn init_tracing(env: &str, service: &str) {
    INIT.call_once(|| {
        let format = LogFormat::for_environment(env);
        let registry = tracing_subscriber::registry().with(env_filter());

        match format {
            LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
            LogFormat::Compact => registry
                .with(tracing_subscriber::fmt::layer().compact().with_target(false))
                .init(),
        }

        tracing::info!(service = %service, env = %env, ?format, "Tracing initialized");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_for_environment() {
        assert_eq!(LogFormat::for_environment("production"), LogFormat::Json);
        assert_eq!(LogFormat::for_environment("Production"), LogFormat::Json);
        assert_eq!(LogFormat::for_environment("development"), LogFormat::Compact);
        assert_eq!(LogFormat::for_environment("test"), LogFormat::Compact);
    }

    #[test]
    fn test_init_tracing_idempotent() {
        init_tracing("test", "motioncam-test");
        init_tracing("test", "motioncam-test");
    }
}
