use std::{collections::HashMap, env, fs, ops::Deref, path::Path, sync::Arc};

use tracing::debug;

use crate::error::Error;

pub const DEFAULT_CONFIG_FILE: &str = "refswap.conf";
pub const CONFIG_FILE_VAR: &str = "REFSWAP_CONFIG";

const USDC_ADDRESS: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
const WRAPPED_SOL_ADDRESS: &str = "So11111111111111111111111111111111111111112";

#[derive(Debug)]
pub struct AppState<T>(Arc<T>);

impl<T> AppState<T> {
    pub fn new(state: T) -> AppState<T> {
        AppState(Arc::new(state))
    }
}

impl<T> Clone for AppState<T> {
    fn clone(&self) -> AppState<T> {
        AppState(Arc::clone(&self.0))
    }
}

impl<T> Deref for AppState<T> {
    type Target = Arc<T>;

    fn deref(&self) -> &Arc<T> {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: String,
    pub balances_host: String,
    pub quote_feed_host: String,
    pub site_url: String,
    pub timeout: u64,
    pub leaderboard_interval_ms: u64,
    pub countdown_interval_ms: u64,
    pub quote_interval_ms: u64,
    pub quote_debounce_ms: u64,
    pub balance_interval_ms: u64,
    pub retry_max_interval_ms: u64,
    pub socket_reconnect_interval: u64,
    pub store_path: String,
    pub default_from_address: String,
    pub native_symbol: String,
    pub wrapped_native_address: String,
    pub reward_delay_days: i64,
    pub address_symbols: HashMap<String, String>,
    pub wallet_seed: Option<String>,
}

impl Config {
    pub fn ref_info_url(&self, code: &str) -> String {
        format!("{}/ref/{}", self.api_host, code)
    }

    pub fn ref_list_url(&self) -> String {
        format!("{}/ref/list", self.api_host)
    }

    pub fn swap_url(&self) -> String {
        format!("{}/swap", self.api_host)
    }

    pub fn balances_url(&self, wallet: &str) -> String {
        format!("{}/balances/{}", self.balances_host, wallet)
    }

    pub fn share_link(&self, code: &str) -> String {
        format!("{}?ref={}", self.site_url, code)
    }

    pub fn overview_link(&self, code: &str) -> String {
        format!("{}/referral/{}", self.site_url, code)
    }

    pub fn trade_link(&self, code: &str) -> String {
        format!("{}/?ref={}", self.site_url, code)
    }

    pub fn symbol_of(&self, address: &str) -> Option<&str> {
        self.address_symbols.get(address).map(String::as_str)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_host: String::from("https://api.cryptoscan.pro"),
            balances_host: String::from("https://ultra-api.jup.ag"),
            quote_feed_host: String::from("wss://api.cryptoscan.pro/quotes"),
            site_url: String::from("https://cryptoscan.pro"),
            timeout: 10,
            leaderboard_interval_ms: 5_000,
            countdown_interval_ms: 1_000,
            quote_interval_ms: 5_000,
            quote_debounce_ms: 150,
            balance_interval_ms: 60_000,
            retry_max_interval_ms: 60_000,
            socket_reconnect_interval: 3,
            store_path: String::from("refswap-store.json"),
            default_from_address: USDC_ADDRESS.to_owned(),
            native_symbol: String::from("SOL"),
            wrapped_native_address: WRAPPED_SOL_ADDRESS.to_owned(),
            reward_delay_days: 7,
            address_symbols: default_address_symbols(),
            wallet_seed: None,
        }
    }
}

fn default_address_symbols() -> HashMap<String, String> {
    HashMap::from([
        (USDC_ADDRESS.to_owned(), String::from("USDC")),
        (WRAPPED_SOL_ADDRESS.to_owned(), String::from("SOL")),
    ])
}

pub fn get_configuration() -> Result<Config, Error> {
    let defaults = Config::default();

    let mut address_symbols = defaults.address_symbols.clone();
    if let Ok(value) = env::var("ADDRESS_SYMBOLS") {
        address_symbols.extend(parse_address_symbols(&value)?);
    }

    let config = Config {
        api_host: var_or("API_HOST", defaults.api_host)?,
        balances_host: var_or("BALANCES_HOST", defaults.balances_host)?,
        quote_feed_host: var_or("QUOTE_FEED_HOST", defaults.quote_feed_host)?,
        site_url: var_or("SITE_URL", defaults.site_url)?,
        timeout: parse_or("TIMEOUT", defaults.timeout)?,
        leaderboard_interval_ms: parse_or(
            "LEADERBOARD_INTERVAL_MS",
            defaults.leaderboard_interval_ms,
        )?,
        countdown_interval_ms: parse_or(
            "COUNTDOWN_INTERVAL_MS",
            defaults.countdown_interval_ms,
        )?,
        quote_interval_ms: parse_or(
            "QUOTE_INTERVAL_MS",
            defaults.quote_interval_ms,
        )?,
        quote_debounce_ms: parse_or(
            "QUOTE_DEBOUNCE_MS",
            defaults.quote_debounce_ms,
        )?,
        balance_interval_ms: parse_or(
            "BALANCE_INTERVAL_MS",
            defaults.balance_interval_ms,
        )?,
        retry_max_interval_ms: parse_or(
            "RETRY_MAX_INTERVAL_MS",
            defaults.retry_max_interval_ms,
        )?,
        socket_reconnect_interval: parse_or(
            "SOCKET_RECONNECT_INTERVAL",
            defaults.socket_reconnect_interval,
        )?,
        store_path: var_or("STORE_PATH", defaults.store_path)?,
        default_from_address: var_or(
            "DEFAULT_FROM_ADDRESS",
            defaults.default_from_address,
        )?,
        native_symbol: var_or("NATIVE_SYMBOL", defaults.native_symbol)?,
        wrapped_native_address: var_or(
            "WRAPPED_NATIVE_ADDRESS",
            defaults.wrapped_native_address,
        )?,
        reward_delay_days: parse_or(
            "REWARD_DELAY_DAYS",
            defaults.reward_delay_days,
        )?,
        address_symbols,
        wallet_seed: optional_var("WALLET_SEED")?,
    };

    Ok(config)
}

/// Loads the optional config file into the process environment.
/// Variables already present in the environment win over the file.
pub fn set_configuration() -> Result<(), Error> {
    let path = env::var(CONFIG_FILE_VAR)
        .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_owned());

    if !Path::new(&path).exists() {
        debug!("Config file {} not found, using environment only", path);
        return Ok(());
    }

    let config_string = fs::read_to_string(&path)?;
    for (key, value) in parse_config_string(&config_string) {
        if env::var(key).is_err() {
            env::set_var(key, value);
        }
    }

    Ok(())
}

fn parse_config_string(config: &str) -> Vec<(&str, &str)> {
    config
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let index = line.find('=')?;
            let (key, value) = line.split_at(index);
            Some((key.trim(), value[1..].trim()))
        })
        .collect()
}

/// Parses `(address,SYMBOL),(address,SYMBOL)` pairs.
fn parse_address_symbols(
    value: &str,
) -> Result<HashMap<String, String>, Error> {
    let mut symbols = HashMap::new();

    let items = value
        .split("),")
        .map(|item| item.trim_matches(|c: char| c == '(' || c == ')'));

    for item in items {
        if item.is_empty() {
            continue;
        }
        let (address, symbol) =
            item.split_once(',').ok_or(Error::InvalidOption {
                option: format!("ADDRESS_SYMBOLS entry '{}'", item),
            })?;
        symbols.insert(address.trim().to_owned(), symbol.trim().to_owned());
    }

    Ok(symbols)
}

fn var_or(key: &str, default: String) -> Result<String, Error> {
    Ok(optional_var(key)?.unwrap_or(default))
}

fn optional_var(key: &str) -> Result<Option<String>, Error> {
    match env::var(key) {
        Ok(value) if value.is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(Error::VAR(e)),
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T, Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional_var(key)? {
        Some(value) => value.parse().map_err(|e: T::Err| {
            Error::ConfigurationError(format!("{}: {}", key, e))
        }),
        None => Ok(default),
    }
}
