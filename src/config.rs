//! 连接配置。
//!
//! 配置项可以直接构造，也可以从环境变量（以及 `.env` 文件）中读取。

use std::env;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::consts::DEFAULT_PIPELINE_SIZE;
use crate::error::{ConfigError, ParseError};

/// 日志级别环境变量
pub const LOG_LEVEL: &str = "LOG_LEVEL";
pub const PIPELINE_SIZE: &str = "PIPELINE_SIZE";
pub const CHARSET: &str = "CHARSET";
pub const DB_DATABASE: &str = "DB_DATABASE";
pub const DB_USER: &str = "DB_USER";
pub const DB_PASSWORD: &str = "DB_PASSWORD";

/// 文本协议值使用的字符编码。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Charset {
    #[default]
    Utf8,
    Latin1,
}

impl Charset {
    /// 将字符串编码为字节。Latin-1 无法表示的字符返回错误。
    pub fn encode(self, text: &str) -> Result<Bytes, ParseError> {
        match self {
            Charset::Utf8 => Ok(Bytes::copy_from_slice(text.as_bytes())),
            Charset::Latin1 => text
                .chars()
                .map(|c| {
                    u8::try_from(u32::from(c)).map_err(|_| {
                        ParseError::Encoding(format!("{:?} is not representable in latin-1", c))
                    })
                })
                .collect::<Result<Vec<u8>, ParseError>>()
                .map(Bytes::from),
        }
    }

    pub fn decode(self, raw: &[u8]) -> Result<String, ParseError> {
        match self {
            Charset::Utf8 => Ok(String::from_utf8(raw.to_vec())?),
            Charset::Latin1 => Ok(raw.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

impl FromStr for Charset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Charset, ConfigError> {
        match s.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Charset::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(Charset::Latin1),
            _ => Err(ConfigError::InvalidValue {
                key: CHARSET,
                value: s.to_string(),
            }),
        }
    }
}

/// 连接凭据，只在启动阶段使用。
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

// 不打印密码
impl fmt::Debug for Credentials {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Credentials")
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// 管线深度，必须大于 0
    pub pipeline_size: usize,
    pub charset: Charset,
    pub credentials: Credentials,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            pipeline_size: DEFAULT_PIPELINE_SIZE,
            charset: Charset::default(),
            credentials: Credentials::default(),
        }
    }
}

impl Config {
    pub fn with_pipeline_size(mut self, pipeline_size: usize) -> Config {
        self.pipeline_size = pipeline_size;
        self
    }

    pub fn with_charset(mut self, charset: Charset) -> Config {
        self.charset = charset;
        self
    }

    pub fn with_password(mut self, password: impl ToString) -> Config {
        self.credentials.password = Some(password.to_string());
        self
    }

    pub fn with_user(mut self, user: impl ToString) -> Config {
        self.credentials.user = Some(user.to_string());
        self
    }

    pub fn with_database(mut self, database: impl ToString) -> Config {
        self.credentials.database = Some(database.to_string());
        self
    }

    /// 读取 `.env` 文件后从环境变量加载配置。
    pub fn from_env() -> Result<Config, ConfigError> {
        dotenv::dotenv().ok();
        Config::from_lookup(|key| env::var(key).ok())
    }

    /// 通过任意的键查找函数加载配置，未设置的键使用默认值。
    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(value) = lookup(PIPELINE_SIZE) {
            config.pipeline_size = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: PIPELINE_SIZE,
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(CHARSET) {
            config.charset = value.trim().parse()?;
        }

        config.credentials = Credentials {
            database: lookup(DB_DATABASE),
            user: lookup(DB_USER),
            password: lookup(DB_PASSWORD),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline_size == 0 {
            return Err(ConfigError::ZeroPipelineSize);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(10, config.pipeline_size);
        assert_eq!(Charset::Utf8, config.charset);
    }

    #[test]
    fn reads_all_keys() {
        let config = Config::from_lookup(lookup_from(&[
            (PIPELINE_SIZE, "32"),
            (CHARSET, "latin-1"),
            (DB_DATABASE, "3"),
            (DB_USER, "alice"),
            (DB_PASSWORD, "secret"),
        ]))
        .unwrap();

        assert_eq!(32, config.pipeline_size);
        assert_eq!(Charset::Latin1, config.charset);
        assert_eq!(Some("3".to_string()), config.credentials.database);
        assert_eq!(Some("alice".to_string()), config.credentials.user);
        assert_eq!(Some("secret".to_string()), config.credentials.password);
    }

    #[test]
    fn rejects_zero_and_garbage_pipeline_size() {
        assert!(matches!(
            Config::from_lookup(lookup_from(&[(PIPELINE_SIZE, "0")])),
            Err(ConfigError::ZeroPipelineSize)
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[(PIPELINE_SIZE, "many")])),
            Err(ConfigError::InvalidValue { key: PIPELINE_SIZE, .. })
        ));
    }

    #[test]
    fn password_is_not_printed() {
        let config = Config::default().with_password("hunter2");
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn latin1_round_trip_and_rejection() {
        let raw = Charset::Latin1.encode("café").unwrap();
        assert_eq!(&b"caf\xe9"[..], &raw[..]);
        assert_eq!("café", Charset::Latin1.decode(&raw).unwrap());

        assert!(matches!(
            Charset::Latin1.encode("你好"),
            Err(ParseError::Encoding(_))
        ));
        assert!(Charset::Utf8.decode(&raw).is_err());
    }
}
