//! Runtime configuration read from the environment

use crate::core::poller::PollPolicy;
use di::inject;
use di::injectable;
use log::warn;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

static TEST_SETTINGS: Mutex<Option<Settings>> = Mutex::new(None);

#[derive(Debug, Clone)]
pub struct Settings {
    pub listen_addr: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub assistant_model: String,
    pub media_root: PathBuf,
    pub bcrypt_cost: u32,
    pub cors_origins: Vec<String>,
    pub poll_policy: PollPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            listen_addr: "0.0.0.0:3000".to_owned(),
            openai_api_key: String::new(),
            openai_base_url: "https://api.openai.com/v1".to_owned(),
            assistant_model: "gpt-3.5-turbo-0125".to_owned(),
            media_root: PathBuf::from("media"),
            bcrypt_cost: bcrypt::DEFAULT_COST,
            cors_origins: vec![
                "http://localhost:3000".to_owned(),
                "http://localhost:5173".to_owned(),
            ],
            poll_policy: PollPolicy::default(),
        }
    }
}

#[injectable]
impl Settings {
    #[inject]
    pub fn create() -> Settings {
        if let Some(settings) = TEST_SETTINGS.lock().ok().and_then(|s| s.clone()) {
            return settings;
        }

        Settings::from_env()
    }
}

impl Settings {
    pub fn from_env() -> Settings {
        dotenvy::dotenv().ok();
        let defaults = Settings::default();

        let openai_api_key = env::var("OPENAI_API_KEY").unwrap_or_default();
        if openai_api_key.is_empty() {
            warn!("OPENAI_API_KEY is not set, remote calls will be rejected");
        }

        let poll_policy = PollPolicy {
            interval: env_parse("RUN_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_policy.interval),
            backoff: env_parse("RUN_POLL_BACKOFF").unwrap_or(defaults.poll_policy.backoff),
            max_interval: env_parse("RUN_POLL_MAX_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_policy.max_interval),
            max_attempts: env_parse("RUN_POLL_MAX_ATTEMPTS")
                .unwrap_or(defaults.poll_policy.max_attempts),
        };

        Settings {
            listen_addr: env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            openai_api_key,
            openai_base_url: env::var("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            assistant_model: env::var("ASSISTANT_MODEL").unwrap_or(defaults.assistant_model),
            media_root: env::var("MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.media_root),
            bcrypt_cost: env_parse("BCRYPT_COST").unwrap_or(defaults.bcrypt_cost),
            cors_origins: env::var("CORS_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
            poll_policy,
        }
    }

    /// Makes every DI-created `Settings` a copy of `settings` until cleared.
    pub fn set_test_settings(settings: Settings) {
        if let Ok(mut slot) = TEST_SETTINGS.lock() {
            *slot = Some(settings);
        }
    }

    pub fn clear_test_settings() {
        if let Ok(mut slot) = TEST_SETTINGS.lock() {
            *slot = None;
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match T::from_str(raw.trim()) {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("ignoring unparsable value for {key}: {raw:?}");
            None
        }
    }
}
