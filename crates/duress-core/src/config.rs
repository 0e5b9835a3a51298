use std::{
    env,
    fmt::Display,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use crate::{domain::AccountId, errors::Error, location::GeoPoint, Result};

/// Runtime configuration, read from the environment (and `.env` if present).
#[derive(Clone, Debug)]
pub struct Config {
    /// Only needed to reach the remote service; `bot_token()` checks it.
    pub telegram_bot_token: Option<String>,
    pub account_id: AccountId,
    pub actions_file: PathBuf,
    pub confirmation_timeout: Duration,
    pub location: Option<GeoPoint>,
    pub recent_messages: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN").and_then(non_empty);

        let account_id =
            AccountId(parse_or(&get, "DURESS_ACCOUNT_ID", AccountId::default().0));

        let actions_file = match get("DURESS_ACTIONS_FILE").and_then(non_empty) {
            Some(p) => PathBuf::from(p),
            None => {
                let home = get("HOME")
                    .and_then(non_empty)
                    .ok_or_else(|| Error::Config("HOME is not set".to_string()))?;
                PathBuf::from(home).join(".config/duress/actions.json")
            }
        };

        let confirmation_timeout =
            Duration::from_millis(parse_or(&get, "DURESS_CONFIRMATION_TIMEOUT_MS", 30_000u64));

        let location = get("DURESS_LOCATION")
            .and_then(non_empty)
            .map(|v| GeoPoint::parse(&v))
            .transpose()?;

        let recent_messages = parse_or(&get, "DURESS_RECENT_MESSAGES", 256usize);

        Ok(Self {
            telegram_bot_token,
            account_id,
            actions_file,
            confirmation_timeout,
            location,
            recent_messages,
        })
    }

    /// The bot token, required by anything that talks to Telegram.
    pub fn bot_token(&self) -> Result<&str> {
        self.telegram_bot_token.as_deref().ok_or_else(|| {
            Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
        })
    }
}

/// Parse a numeric setting. Unset or unparsable values use `default`.
fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display,
{
    let Some(raw) = get(key).and_then(non_empty) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => v,
        Err(_) => {
            tracing::warn!(key, value = %raw, %default, "invalid number in config, using default");
            default
        }
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = &val[1..val.len() - 1];
        }
        out.push((key.to_string(), val.to_string()));
    }
    out
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
