use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ParseError, ServerError};
use crate::postgres::{BackendMessage, PgColumn, PgRow};

/// 读取 ErrorResponse / NoticeResponse 的字段列表。
///
/// 格式为若干个 "1 字节字段码 + 以 0 结尾的字符串"，最后以单个 0 字节结束。
/// 缺少结束符或结束符之后还有数据都是协议错误。
pub fn read_error(buf: &mut Bytes) -> Result<ServerError, ParseError> {
    let mut fields = Vec::new();

    loop {
        if !buf.has_remaining() {
            return Err(ParseError::Parse(
                "protocol error; error fields not terminated".into(),
            ));
        }

        let code = buf.get_u8();
        if code == 0 {
            if buf.has_remaining() {
                return Err(ParseError::Parse(format!(
                    "protocol error; {} bytes remaining after error fields",
                    buf.remaining()
                )));
            }
            break;
        }

        let value = get_cstring(buf)?;
        fields.push((char::from(code), value));
    }

    Ok(ServerError::new(fields))
}

pub fn write_error(error: &ServerError, dst: &mut BytesMut) -> Result<(), ParseError> {
    for (code, value) in &error.fields {
        let code = u8::try_from(u32::from(*code))
            .ok()
            .filter(|c| *c != 0)
            .ok_or_else(|| ParseError::Encoding(format!("invalid field code {:?}", code)))?;
        dst.put_u8(code);
        put_cstring(dst, value)?;
    }
    dst.put_u8(0);
    Ok(())
}

/// 读取 RowDescription。
pub fn read_columns(buf: &mut Bytes) -> Result<Vec<PgColumn>, ParseError> {
    let count = get_u16(buf)?;
    let mut columns = Vec::with_capacity(usize::from(count));

    for _ in 0..count {
        columns.push(PgColumn {
            name: get_cstring(buf)?,
            table_oid: get_i32(buf)?,
            column_index: get_u16(buf)?,
            type_oid: get_i32(buf)?,
            type_size: get_i16(buf)?,
            type_modifier: get_i32(buf)?,
            format: get_i16(buf)?,
        });
    }

    Ok(columns)
}

pub fn write_columns(columns: &[PgColumn], dst: &mut BytesMut) -> Result<(), ParseError> {
    dst.put_u16(u16::try_from(columns.len())?);
    for column in columns {
        put_cstring(dst, &column.name)?;
        dst.put_i32(column.table_oid);
        dst.put_u16(column.column_index);
        dst.put_i32(column.type_oid);
        dst.put_i16(column.type_size);
        dst.put_i32(column.type_modifier);
        dst.put_i16(column.format);
    }
    Ok(())
}

/// 读取 DataRow。长度为负的列是 NULL，而不是空字节串。
pub fn read_row(buf: &mut Bytes) -> Result<PgRow, ParseError> {
    let count = get_u16(buf)?;
    let mut row = Vec::with_capacity(usize::from(count));

    for _ in 0..count {
        let len = get_i32(buf)?;
        if len < 0 {
            row.push(None);
            continue;
        }

        let len = usize::try_from(len)?;
        if buf.remaining() < len {
            return Err(truncated("data row"));
        }
        row.push(Some(buf.split_to(len)));
    }

    Ok(row)
}

pub fn write_row(row: &[Option<Bytes>], dst: &mut BytesMut) -> Result<(), ParseError> {
    dst.put_u16(u16::try_from(row.len())?);
    for cell in row {
        match cell {
            Some(value) => {
                dst.put_i32(i32::try_from(value.len())?);
                dst.put_slice(value);
            }
            None => dst.put_i32(-1),
        }
    }
    Ok(())
}

/// 从流缓冲区中切出一条完整的后端消息。
///
/// 格式为类型字节 + 4 字节长度（包含长度字段自身）+ 消息体。数据不足时返回 `None`
/// 且不消耗任何字节。
pub fn read_message(src: &mut BytesMut) -> Result<Option<BackendMessage>, ParseError> {
    if src.len() < 5 {
        return Ok(None);
    }

    let len = i32::from_be_bytes([src[1], src[2], src[3], src[4]]);
    if len < 4 {
        return Err(ParseError::Parse(format!(
            "protocol error; invalid message length {}",
            len
        )));
    }

    let total = 1 + usize::try_from(len)?;
    if src.len() < total {
        return Ok(None);
    }

    let mut message = src.split_to(total).freeze();
    let tag = message.get_u8();
    message.advance(4);

    Ok(Some(BackendMessage { tag, body: message }))
}

pub fn write_message(message: &BackendMessage, dst: &mut BytesMut) -> Result<(), ParseError> {
    dst.put_u8(message.tag);
    dst.put_i32(i32::try_from(message.body.len() + 4)?);
    dst.put_slice(&message.body);
    Ok(())
}

fn truncated(what: &str) -> ParseError {
    ParseError::Parse(format!("protocol error; truncated {}", what))
}

fn get_i16(buf: &mut Bytes) -> Result<i16, ParseError> {
    if buf.remaining() < 2 {
        return Err(truncated("int16"));
    }
    Ok(buf.get_i16())
}

fn get_u16(buf: &mut Bytes) -> Result<u16, ParseError> {
    if buf.remaining() < 2 {
        return Err(truncated("int16"));
    }
    Ok(buf.get_u16())
}

fn get_i32(buf: &mut Bytes) -> Result<i32, ParseError> {
    if buf.remaining() < 4 {
        return Err(truncated("int32"));
    }
    Ok(buf.get_i32())
}

// 以 0 结尾的字符串，结尾的 0 被消耗
fn get_cstring(buf: &mut Bytes) -> Result<String, ParseError> {
    let end = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| truncated("string"))?;
    let raw = buf.split_to(end);
    buf.advance(1);
    Ok(String::from_utf8(raw.to_vec())?)
}

fn put_cstring(dst: &mut BytesMut, value: &str) -> Result<(), ParseError> {
    if value.as_bytes().contains(&0) {
        return Err(ParseError::Encoding(format!(
            "string {:?} contains a NUL byte",
            value
        )));
    }
    dst.put_slice(value.as_bytes());
    dst.put_u8(0);
    Ok(())
}
