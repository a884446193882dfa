use tokio::fs;

use crate::network::packet::{ConnectProperties, LastWill, Login, Protocol};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O: {0}")]
    IO(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// 客户端选项
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Options {
    pub client_id: String,
    /// keepalive 秒数，0 表示关闭
    #[serde(default = "default_keep_alive")]
    pub keep_alive: u16,
    #[serde(default = "default_true")]
    pub clean_session: bool,
    #[serde(default)]
    pub version: Version,
    /// 连接异常断开后是否自动重连
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
    #[serde(default)]
    pub login: Option<LoginConfig>,
    /// 遗嘱消息，只能通过代码设置
    #[serde(skip)]
    pub last_will: Option<LastWill>,
    /// v5 连接属性，只能通过代码设置
    #[serde(skip)]
    pub connect_properties: Option<ConnectProperties>,
}

impl Options {
    pub fn new(client_id: impl Into<String>) -> Self {
        Options {
            client_id: client_id.into(),
            keep_alive: default_keep_alive(),
            clean_session: true,
            version: Version::default(),
            auto_reconnect: true,
            login: None,
            last_will: None,
            connect_properties: None,
        }
    }

    pub async fn from_path(path: &str) -> Result<Self, Error> {
        let s = fs::read_to_string(path).await?;
        Ok(toml::from_str::<Options>(&s)?)
    }
}

/// 协议版本选择
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Version {
    /// mqtt 3.1.1
    #[default]
    V4,
    /// mqtt 5.0
    V5,
}

impl From<Version> for Protocol {
    fn from(version: Version) -> Self {
        match version {
            Version::V4 => Protocol::V4,
            Version::V5 => Protocol::V5,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct LoginConfig {
    pub username: String,
    pub password: String,
}

impl From<LoginConfig> for Login {
    fn from(login: LoginConfig) -> Self {
        Login {
            username: login.username,
            password: login.password,
        }
    }
}

fn default_keep_alive() -> u16 {
    60
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_options() {
        let options: Options = toml::from_str(r#"client_id = "heron-1""#).unwrap();
        assert_eq!(options.client_id, "heron-1");
        assert_eq!(options.keep_alive, 60);
        assert!(options.clean_session);
        assert!(options.auto_reconnect);
        assert_eq!(options.version, Version::V4);
        assert!(options.login.is_none());
    }

    #[test]
    fn parse_full_options() {
        let options: Options = toml::from_str(
            r#"
            client_id = "heron-2"
            keep_alive = 30
            clean_session = false
            version = "v5"
            auto_reconnect = false

            [login]
            username = "user"
            password = "pass"
            "#,
        )
        .unwrap();
        assert_eq!(options.keep_alive, 30);
        assert!(!options.clean_session);
        assert_eq!(options.version, Version::V5);
        assert!(!options.auto_reconnect);
        assert_eq!(options.login.unwrap().username, "user");
    }
}
