//! Provides a type representing a Redis protocol frame as well as utilities for
//! parsing frames from a byte array and encoding them back.
//!
//! Redis serialization protocol (RESP) specification:
//!  https://redis.io/docs/reference/protocol-spec/

use std::convert::TryInto;
use std::fmt;
use std::io::Cursor;
use std::str;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::config::Charset;
use crate::consts::MAX_BULK_LEN;
use crate::error::ParseError;

// RESP 协议中的不同帧类型
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
}

// 允许 Frame 和 &str 比较，Simple 和 Bulk 以外的类型总是不相等
impl PartialEq<&str> for Frame {
    fn eq(&self, other: &&str) -> bool {
        match self {
            Frame::Simple(s) => s.eq(other),
            Frame::Bulk(s) => s.eq(other),
            _ => false,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Frame::Simple(response) => response.fmt(fmt),
            Frame::Error(msg) => write!(fmt, "error: {}", msg),
            Frame::Integer(num) => num.fmt(fmt),
            // Bulk 尽量按 UTF-8 显示，否则输出字节的调试信息
            Frame::Bulk(msg) => match str::from_utf8(msg) {
                Ok(string) => string.fmt(fmt),
                Err(_) => write!(fmt, "{:?}", msg),
            },
            Frame::Null => "(nil)".fmt(fmt),
            Frame::Array(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(fmt, " ")?;
                    }
                    part.fmt(fmt)?;
                }
                Ok(())
            }
        }
    }
}

impl Frame {
    /// 由参数列表构造一条命令：一个由 Bulk 组成的数组。
    pub fn command<I>(parts: I) -> Frame
    where
        I: IntoIterator<Item = Bytes>,
    {
        Frame::Array(parts.into_iter().map(Frame::Bulk).collect())
    }

    // 检查 src 中的数据是否可以解析为一个完整的 Frame，成功时光标停在帧尾
    pub fn check(src: &mut Cursor<&[u8]>) -> Result<(), ParseError> {
        match get_u8(src)? {
            b'+' | b'-' => {
                get_line(src)?;
                Ok(())
            }
            b':' => {
                let _ = get_integer(src)?;
                Ok(())
            }
            b'$' => {
                // Null Bulk String: `$-1\r\n`
                if b'-' == peek_u8(src)? {
                    get_line(src)?;
                } else {
                    // 跳过数据和结尾的 \r\n
                    let (_, n) = get_bulk_len(src)?;
                    skip(src, n)?;
                }
                Ok(())
            }
            b'*' => {
                // Null Array: `*-1\r\n`
                if b'-' == peek_u8(src)? {
                    get_line(src)?;
                    return Ok(());
                }
                let len = get_decimal(src)?;
                for _ in 0..len {
                    Frame::check(src)?;
                }
                Ok(())
            }
            actual => Err(ParseError::Parse(format!(
                "protocol error; invalid frame type byte `{}`",
                actual
            ))),
        }
    }

    // 解析 src 中的数据为 Frame，调用前应先通过 `check`
    pub fn parse(src: &mut Cursor<&[u8]>, charset: Charset) -> Result<Frame, ParseError> {
        match get_u8(src)? {
            b'+' => {
                let line = get_line(src)?;
                Ok(Frame::Simple(charset.decode(line)?))
            }
            b'-' => {
                let line = get_line(src)?;
                Ok(Frame::Error(charset.decode(line)?))
            }
            b':' => Ok(Frame::Integer(get_integer(src)?)),
            b'$' => {
                if b'-' == peek_u8(src)? {
                    let line = get_line(src)?;
                    if line != b"-1" {
                        return Err(ParseError::Parse(
                            "protocol error; invalid frame format".into(),
                        ));
                    }
                    Ok(Frame::Null)
                } else {
                    let (len, n) = get_bulk_len(src)?;
                    if src.remaining() < n {
                        return Err(ParseError::Incomplete);
                    }
                    let data = Bytes::copy_from_slice(&src.chunk()[..len]);
                    if &src.chunk()[len..n] != b"\r\n" {
                        return Err(ParseError::Parse(
                            "protocol error; bulk string not terminated by CRLF".into(),
                        ));
                    }
                    skip(src, n)?;
                    Ok(Frame::Bulk(data))
                }
            }
            b'*' => {
                if b'-' == peek_u8(src)? {
                    let line = get_line(src)?;
                    if line != b"-1" {
                        return Err(ParseError::Parse(
                            "protocol error; invalid frame format".into(),
                        ));
                    }
                    return Ok(Frame::Null);
                }
                let len = get_decimal(src)?.try_into()?;
                let mut out = Vec::with_capacity(len);
                for _ in 0..len {
                    out.push(Frame::parse(src, charset)?);
                }
                Ok(Frame::Array(out))
            }
            _ => Err(ParseError::Unimplemented),
        }
    }

    /// 将帧编码写入 `dst`。纯内存操作，不涉及 I/O。
    pub fn encode(&self, dst: &mut BytesMut, charset: Charset) -> Result<(), ParseError> {
        match self {
            Frame::Simple(val) => {
                dst.put_u8(b'+');
                put_line(dst, &charset.encode(val)?)?;
            }
            Frame::Error(val) => {
                dst.put_u8(b'-');
                put_line(dst, &charset.encode(val)?)?;
            }
            Frame::Integer(val) => {
                dst.put_u8(b':');
                put_decimal(dst, *val);
            }
            Frame::Null => dst.put_slice(b"$-1\r\n"),
            Frame::Bulk(val) => {
                dst.put_u8(b'$');
                put_decimal(dst, val.len() as i64);
                dst.put_slice(val);
                dst.put_slice(b"\r\n");
            }
            Frame::Array(val) => {
                dst.put_u8(b'*');
                put_decimal(dst, val.len() as i64);
                for entry in val {
                    entry.encode(dst, charset)?;
                }
            }
        }
        Ok(())
    }
}

// 简单字符串和错误不能包含换行
fn put_line(dst: &mut BytesMut, line: &[u8]) -> Result<(), ParseError> {
    if line.iter().any(|&b| b == b'\r' || b == b'\n') {
        return Err(ParseError::Parse(
            "protocol error; simple string contains CR or LF".into(),
        ));
    }
    dst.put_slice(line);
    dst.put_slice(b"\r\n");
    Ok(())
}

fn put_decimal(dst: &mut BytesMut, val: i64) {
    dst.put_slice(val.to_string().as_bytes());
    dst.put_slice(b"\r\n");
}

// 跳过 n 个字节
fn skip(src: &mut Cursor<&[u8]>, n: usize) -> Result<(), ParseError> {
    if src.remaining() < n {
        return Err(ParseError::Incomplete);
    }
    src.advance(n);
    Ok(())
}

// 查看但不消耗当前字节
fn peek_u8(src: &mut Cursor<&[u8]>) -> Result<u8, ParseError> {
    if !src.has_remaining() {
        return Err(ParseError::Incomplete);
    }
    Ok(src.chunk()[0])
}

fn get_u8(src: &mut Cursor<&[u8]>) -> Result<u8, ParseError> {
    if !src.has_remaining() {
        return Err(ParseError::Incomplete);
    }
    Ok(src.get_u8())
}

// 解析长度字段
fn get_decimal(src: &mut Cursor<&[u8]>) -> Result<u64, ParseError> {
    use atoi::atoi;
    let line = get_line(src)?;
    atoi::<u64>(line).ok_or_else(|| {
        ParseError::Parse("protocol error; invalid frame format to get decimal".into())
    })
}

// 读取 Bulk 的长度行，返回数据长度和包含结尾 \r\n 的总长度
fn get_bulk_len(src: &mut Cursor<&[u8]>) -> Result<(usize, usize), ParseError> {
    let len: usize = get_decimal(src)?.try_into()?;
    if len > MAX_BULK_LEN {
        return Err(ParseError::Parse(format!(
            "protocol error; bulk length {} exceeds {}",
            len, MAX_BULK_LEN
        )));
    }
    let n = len.checked_add(2).ok_or_else(|| {
        ParseError::Parse(format!("protocol error; bulk length {} overflows", len))
    })?;
    Ok((len, n))
}

// 解析整数应答，可以为负数
fn get_integer(src: &mut Cursor<&[u8]>) -> Result<i64, ParseError> {
    use atoi::atoi;
    let line = get_line(src)?;
    atoi::<i64>(line)
        .ok_or_else(|| ParseError::Parse("protocol error; invalid integer frame".into()))
}

// 获取一行数据，以 \r\n 结尾
fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], ParseError> {
    let start = src.position() as usize;
    let end = src.get_ref().len().saturating_sub(1);
    for i in start..end {
        if src.get_ref()[i] == b'\r' && src.get_ref()[i + 1] == b'\n' {
            src.set_position((i + 2) as u64);
            return Ok(&src.get_ref()[start..i]);
        }
    }
    Err(ParseError::Incomplete)
}
