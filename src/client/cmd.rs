use bytes::Bytes;

use crate::config::Charset;
use crate::error::ParseError;

/// 命令参数。
///
/// 文本参数在写出前按配置的字符集编码，数字以十进制文本发送。
#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    Text(String),
    Bytes(Bytes),
    Int(i64),
    /// 无符号整数，例如 `SCAN` 的游标
    UInt(u64),
    Float(f64),
}

impl Arg {
    pub fn into_bytes(self, charset: Charset) -> Result<Bytes, ParseError> {
        match self {
            Arg::Text(text) => charset.encode(&text),
            Arg::Bytes(bytes) => Ok(bytes),
            Arg::Int(n) => Ok(Bytes::from(n.to_string())),
            Arg::UInt(n) => Ok(Bytes::from(n.to_string())),
            Arg::Float(f) => Ok(Bytes::from(f.to_string())),
        }
    }
}

impl From<&str> for Arg {
    fn from(src: &str) -> Arg {
        Arg::Text(src.to_string())
    }
}

impl From<String> for Arg {
    fn from(src: String) -> Arg {
        Arg::Text(src)
    }
}

impl From<&String> for Arg {
    fn from(src: &String) -> Arg {
        Arg::Text(src.clone())
    }
}

impl From<Bytes> for Arg {
    fn from(src: Bytes) -> Arg {
        Arg::Bytes(src)
    }
}

impl From<Vec<u8>> for Arg {
    fn from(src: Vec<u8>) -> Arg {
        Arg::Bytes(Bytes::from(src))
    }
}

impl From<&[u8]> for Arg {
    fn from(src: &[u8]) -> Arg {
        Arg::Bytes(Bytes::copy_from_slice(src))
    }
}

impl From<i64> for Arg {
    fn from(src: i64) -> Arg {
        Arg::Int(src)
    }
}

impl From<i32> for Arg {
    fn from(src: i32) -> Arg {
        Arg::Int(i64::from(src))
    }
}

impl From<u32> for Arg {
    fn from(src: u32) -> Arg {
        Arg::Int(i64::from(src))
    }
}

impl From<u64> for Arg {
    fn from(src: u64) -> Arg {
        Arg::UInt(src)
    }
}

impl From<usize> for Arg {
    fn from(src: usize) -> Arg {
        Arg::UInt(src as u64)
    }
}

impl From<f64> for Arg {
    fn from(src: f64) -> Arg {
        Arg::Float(src)
    }
}
