use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 登录限流只从环境变量读取（宽松解析 + 范围钳制）
    #[serde(skip)]
    pub throttle: ThrottleConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// 部署在反向代理之后时，从 X-Forwarded-For / X-Real-IP 取客户端 IP
    #[serde(default)]
    pub trust_proxy: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            trust_proxy: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8787
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            users: Vec::new(),
            jwt_secret: String::new(),
            token_ttl_seconds: default_token_ttl(),
        }
    }
}

fn default_token_ttl() -> u64 {
    12 * 3600
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// 日志时间戳的 UTC 偏移（小时）
    #[serde(default)]
    pub utc_offset_hours: i8,
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            utc_offset_hours: 0,
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_max_log_files() -> usize {
    7
}

pub const ENV_WINDOW_MS: &str = "LOGIN_RATE_LIMIT_WINDOW_MS";
pub const ENV_BLOCK_MS: &str = "LOGIN_RATE_LIMIT_BLOCK_MS";
pub const ENV_MAX_ATTEMPTS_PER_USER: &str = "LOGIN_RATE_LIMIT_MAX_ATTEMPTS_PER_USER";
pub const ENV_MAX_ATTEMPTS_PER_IP: &str = "LOGIN_RATE_LIMIT_MAX_ATTEMPTS_PER_IP";
pub const ENV_MAX_KEYS: &str = "LOGIN_RATE_LIMIT_MAX_KEYS";

const MIN_DURATION_MS: u64 = 10 * 1000;
const MAX_DURATION_MS: u64 = 24 * 60 * 60 * 1000;

/// 登录限流配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// 滑动窗口长度，窗口内的失败次数累计到阈值即封禁
    pub window_ms: u64,
    /// 封禁时长
    pub block_ms: u64,
    /// 每个 (ip, client, username) 允许的失败次数
    pub max_attempts_per_user: u32,
    /// 每个 IP 允许的失败次数（更粗粒度，拦截换用户名的撞库）
    pub max_attempts_per_ip: u32,
    /// 跟踪 key 的硬上限
    pub max_tracked_keys: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            window_ms: 10 * 60 * 1000,
            block_ms: 15 * 60 * 1000,
            max_attempts_per_user: 8,
            max_attempts_per_ip: 30,
            max_tracked_keys: 20_000,
        }
    }
}

impl ThrottleConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// 解析失败的值回退到默认值，超出范围的值钳制到边界，从不报错
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            window_ms: bounded(lookup(ENV_WINDOW_MS), defaults.window_ms, MIN_DURATION_MS, MAX_DURATION_MS),
            block_ms: bounded(lookup(ENV_BLOCK_MS), defaults.block_ms, MIN_DURATION_MS, MAX_DURATION_MS),
            max_attempts_per_user: bounded(
                lookup(ENV_MAX_ATTEMPTS_PER_USER),
                u64::from(defaults.max_attempts_per_user),
                1,
                100,
            ) as u32,
            max_attempts_per_ip: bounded(
                lookup(ENV_MAX_ATTEMPTS_PER_IP),
                u64::from(defaults.max_attempts_per_ip),
                1,
                500,
            ) as u32,
            max_tracked_keys: bounded(
                lookup(ENV_MAX_KEYS),
                defaults.max_tracked_keys as u64,
                1_000,
                200_000,
            ) as usize,
        }
    }
}

fn bounded(raw: Option<String>, default: u64, min: u64, max: u64) -> u64 {
    let parsed = raw
        .as_deref()
        .map(str::trim)
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite());

    match parsed {
        Some(v) => {
            let v = v.trunc();
            if v <= min as f64 {
                min
            } else if v >= max as f64 {
                max
            } else {
                v as u64
            }
        }
        None => default,
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        // 加载 .env 文件 (如果存在)
        let _ = dotenvy::dotenv();

        // config.toml 可选，SAUNA__SERVER__PORT 这类环境变量优先
        let mut config: Config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("SAUNA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        if let Ok(secret) = env::var("JWT_SECRET") {
            config.auth.jwt_secret = secret;
        }

        if config.auth.jwt_secret.is_empty() {
            anyhow::bail!("JWT_SECRET 未设置! 请在环境变量、.env 或 config.toml 中配置");
        }

        config.throttle = ThrottleConfig::from_env();

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> ThrottleConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ThrottleConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        assert_eq!(from_pairs(&[]), ThrottleConfig::default());
    }

    #[test]
    fn test_garbage_falls_back_to_default() {
        let cfg = from_pairs(&[
            (ENV_WINDOW_MS, "ten minutes"),
            (ENV_BLOCK_MS, ""),
            (ENV_MAX_ATTEMPTS_PER_USER, "NaN"),
            (ENV_MAX_ATTEMPTS_PER_IP, "inf"),
            (ENV_MAX_KEYS, "-"),
        ]);
        assert_eq!(cfg, ThrottleConfig::default());
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        let cfg = from_pairs(&[
            (ENV_WINDOW_MS, "5"),
            (ENV_BLOCK_MS, "999999999999"),
            (ENV_MAX_ATTEMPTS_PER_USER, "0"),
            (ENV_MAX_ATTEMPTS_PER_IP, "-20"),
            (ENV_MAX_KEYS, "1e9"),
        ]);
        assert_eq!(cfg.window_ms, MIN_DURATION_MS);
        assert_eq!(cfg.block_ms, MAX_DURATION_MS);
        assert_eq!(cfg.max_attempts_per_user, 1);
        assert_eq!(cfg.max_attempts_per_ip, 1);
        assert_eq!(cfg.max_tracked_keys, 200_000);
    }

    #[test]
    fn test_valid_values_are_used() {
        let cfg = from_pairs(&[
            (ENV_WINDOW_MS, " 60000 "),
            (ENV_MAX_ATTEMPTS_PER_USER, "5.9"),
            (ENV_MAX_KEYS, "5000"),
        ]);
        assert_eq!(cfg.window_ms, 60_000);
        assert_eq!(cfg.max_attempts_per_user, 5);
        assert_eq!(cfg.max_tracked_keys, 5_000);
        assert_eq!(cfg.block_ms, ThrottleConfig::default().block_ms);
    }
}
