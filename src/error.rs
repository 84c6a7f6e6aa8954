//! 错误类型定义。
//!
//! 分层：编解码层的 `ParseError`，读写半连接的 `ConnectionError`，
//! 以及管线层可在多个结果槽之间共享的 `PipelineError`。

use std::fmt;
use std::io;
use std::num::TryFromIntError;
use std::string::FromUtf8Error;
use std::sync::Arc;

use thiserror::Error;

/// 编解码错误。
#[derive(Clone, Debug, Error)]
pub enum ParseError {
    /// 缓冲区中的数据还不足以构成一个完整的帧
    #[error("stream ended early")]
    Incomplete,

    #[error("{0}")]
    Parse(String),

    #[error("unimplemented frame type")]
    Unimplemented,

    /// 字符无法用当前字符集表示
    #[error("encoding error: {0}")]
    Encoding(String),

    #[error(transparent)]
    FromUtf8(#[from] FromUtf8Error),

    #[error(transparent)]
    TryFromInt(#[from] TryFromIntError),
}

/// 半连接（读端或写端）上的错误。
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Parse(#[from] ParseError),

    /// 对端在帧中途关闭了连接
    #[error("connection reset by peer")]
    Disconnect,
}

/// 服务端返回的错误应答。
///
/// 以 "字段码 -> 字符串" 的形式保存，与 PostgreSQL 的 ErrorResponse 一致。
/// Redis 的 `-KIND message` 被映射为 `C` = KIND，`M` = message。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerError {
    pub fields: Vec<(char, String)>,
}

impl ServerError {
    pub const CODE: char = 'C';
    pub const MESSAGE: char = 'M';
    pub const SEVERITY: char = 'S';

    pub fn new(fields: Vec<(char, String)>) -> ServerError {
        ServerError { fields }
    }

    /// 从 Redis 错误行（不含前缀 `-`）构造。
    pub fn from_redis(line: &str) -> ServerError {
        let (kind, message) = match line.split_once(' ') {
            Some((kind, message)) => (kind, message),
            None => (line, ""),
        };

        ServerError {
            fields: vec![
                (ServerError::CODE, kind.to_string()),
                (ServerError::MESSAGE, message.to_string()),
            ],
        }
    }

    /// 返回第一个匹配字段码的值。
    pub fn field(&self, code: char) -> Option<&str> {
        self.fields
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, v)| v.as_str())
    }

    pub fn code(&self) -> Option<&str> {
        self.field(ServerError::CODE)
    }

    pub fn message(&self) -> Option<&str> {
        self.field(ServerError::MESSAGE)
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match (self.code(), self.message()) {
            (Some(code), Some(message)) if !message.is_empty() => write!(fmt, "{} {}", code, message),
            (Some(code), _) => code.fmt(fmt),
            (None, Some(message)) => message.fmt(fmt),
            (None, None) => write!(fmt, "{:?}", self.fields),
        }
    }
}

impl std::error::Error for ServerError {}

/// 管线错误。
///
/// 一次连接故障需要同时投递给多个结果槽，所以该类型是 `Clone` 的，
/// 不可克隆的 `io::Error` 用 `Arc` 包装。
#[derive(Clone, Debug, Error)]
pub enum PipelineError {
    /// 启动阶段（认证等）失败，连接不可用
    #[error("setup failed: {0}")]
    Setup(Arc<PipelineError>),

    #[error("write failed: {0}")]
    Write(Arc<io::Error>),

    #[error("read failed: {0}")]
    Read(Arc<io::Error>),

    #[error("malformed reply: {0}")]
    Decode(ParseError),

    #[error("failed to encode request: {0}")]
    Encode(ParseError),

    #[error("connection closed by peer")]
    Disconnect,

    #[error("server error: {0}")]
    Server(ServerError),

    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    /// 管线已正常关闭，不再接受请求
    #[error("pipeline closed")]
    Closed,

    /// 管线被取消，未完成的请求全部失败
    #[error("pipeline cancelled")]
    Cancelled,
}

impl PipelineError {
    pub(crate) fn write(err: ConnectionError) -> PipelineError {
        match err {
            ConnectionError::Io(e) => PipelineError::Write(Arc::new(e)),
            ConnectionError::Parse(e) => PipelineError::Encode(e),
            ConnectionError::Disconnect => PipelineError::Disconnect,
        }
    }

    pub(crate) fn read(err: ConnectionError) -> PipelineError {
        match err {
            ConnectionError::Io(e) => PipelineError::Read(Arc::new(e)),
            ConnectionError::Parse(e) => PipelineError::Decode(e),
            ConnectionError::Disconnect => PipelineError::Disconnect,
        }
    }

    /// 剥掉 `Setup` 包装后的根因。
    pub fn root_cause(&self) -> &PipelineError {
        match self {
            PipelineError::Setup(cause) => cause.root_cause(),
            other => other,
        }
    }
}

/// 调用方在结果槽上观察到的失败。
#[derive(Clone, Debug, Error)]
#[error("fail to execute: {request}: {cause}")]
pub struct RequestFailure {
    pub request: String,
    #[source]
    pub cause: PipelineError,
}

impl RequestFailure {
    pub fn new(request: impl Into<String>, cause: PipelineError) -> RequestFailure {
        RequestFailure {
            request: request.into(),
            cause,
        }
    }

    pub fn cause(&self) -> &PipelineError {
        &self.cause
    }
}

/// 建立客户端时的错误。
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// 凭据无法用配置的字符集编码
    #[error("failed to encode credentials: {0}")]
    Credentials(ParseError),
}

/// 配置加载错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("pipeline size must be at least 1")]
    ZeroPipelineSize,
}
