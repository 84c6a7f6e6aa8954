//! PostgreSQL 后端消息的载荷编解码。
//!
//! 只处理已经分好帧的消息体，不涉及 I/O：错误/通知字段、行描述、数据行，
//! 以及从字节流中切分后端消息。

use bytes::Bytes;

pub use self::protocol::{
    read_columns, read_error, read_message, read_row, write_columns, write_error, write_message,
    write_row,
};

mod protocol;

/// 行描述中的一列。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PgColumn {
    pub name: String,
    /// 所属表的 OID，不是表列时为 0
    pub table_oid: i32,
    pub column_index: u16,
    pub type_oid: i32,
    /// 类型长度，变长类型为负数
    pub type_size: i16,
    pub type_modifier: i32,
    /// 格式码：0 为文本，1 为二进制
    pub format: i16,
}

impl PgColumn {
    pub fn is_text(&self) -> bool {
        self.format == 0
    }
}

/// 一行数据，`None` 为 NULL。
pub type PgRow = Vec<Option<Bytes>>;

/// 一条后端消息：类型字节和消息体。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendMessage {
    pub tag: u8,
    pub body: Bytes,
}

impl BackendMessage {
    pub const ERROR_RESPONSE: u8 = b'E';
    pub const NOTICE_RESPONSE: u8 = b'N';
    pub const ROW_DESCRIPTION: u8 = b'T';
    pub const DATA_ROW: u8 = b'D';
}
