use std::fmt::Debug;
use std::io::Cursor;

use bytes::{Buf, BytesMut};

use crate::config::Charset;
use crate::connection::frame::Frame;
use crate::error::{ParseError, PipelineError, ServerError};

/// 线路编解码器。
///
/// 管线的写任务和读任务各自持有一份克隆，所以解码器可以保存跨调用的增量状态。
pub trait Codec: Clone + Send + 'static {
    /// 写任务在写出期间持有请求的引用，所以需要 `Sync`
    type Request: Debug + Send + Sync + 'static;
    type Response: Debug + Send + 'static;

    /// 将请求编码写入 `dst`，不做任何 I/O。
    fn encode(&mut self, request: &Self::Request, dst: &mut BytesMut) -> Result<(), ParseError>;

    /// 从 `src` 中解码一个应答。
    ///
    /// 返回 `Ok(None)` 表示数据不足且没有消耗任何字节。一旦确定了帧边界，
    /// 无论值是否解析成功都必须消耗整帧的字节，保证后续应答仍然对齐。
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Response>, ParseError>;

    /// 把协议层面的错误应答转换成请求失败，默认原样返回。
    fn check_reply(&self, response: Self::Response) -> Result<Self::Response, PipelineError> {
        Ok(response)
    }
}

/// RESP 编解码器。
#[derive(Clone, Copy, Debug, Default)]
pub struct RedisCodec {
    charset: Charset,
}

impl RedisCodec {
    pub fn new(charset: Charset) -> RedisCodec {
        RedisCodec { charset }
    }
}

impl Codec for RedisCodec {
    type Request = Frame;
    type Response = Frame;

    fn encode(&mut self, request: &Frame, dst: &mut BytesMut) -> Result<(), ParseError> {
        request.encode(dst, self.charset)
    }

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ParseError> {
        let mut buf = Cursor::new(&src[..]);

        match Frame::check(&mut buf) {
            Ok(_) => {
                // 帧的长度
                let len = buf.position() as usize;
                buf.set_position(0);

                let frame = Frame::parse(&mut buf, self.charset);

                // 解析失败也丢弃整帧
                src.advance(len);
                frame.map(Some)
            }
            Err(ParseError::Incomplete) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn check_reply(&self, response: Frame) -> Result<Frame, PipelineError> {
        match response {
            Frame::Error(msg) => Err(PipelineError::Server(ServerError::from_redis(&msg))),
            frame => Ok(frame),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn decodes_back_to_back_replies_one_at_a_time() {
        let mut codec = RedisCodec::default();
        let mut buf = BytesMut::from(&b"+OK\r\n$1\r\n1\r\n$-1\r\n:1"[..]);

        assert_eq!(Some(Frame::Simple("OK".into())), codec.decode(&mut buf).unwrap());
        assert_eq!(Some(Frame::Bulk(Bytes::from("1"))), codec.decode(&mut buf).unwrap());
        assert_eq!(Some(Frame::Null), codec.decode(&mut buf).unwrap());
        // 最后一个整数缺少 CRLF
        assert_eq!(None, codec.decode(&mut buf).unwrap());
        assert_eq!(&b":1"[..], &buf[..]);
    }

    #[test]
    fn malformed_value_still_consumes_its_frame() {
        let mut codec = RedisCodec::default();
        let mut buf = BytesMut::from(&b"+\xff\xfe\r\n+PONG\r\n"[..]);

        assert!(codec.decode(&mut buf).is_err());
        assert_eq!(Some(Frame::Simple("PONG".into())), codec.decode(&mut buf).unwrap());
        assert!(buf.is_empty());
    }

    #[test]
    fn error_reply_becomes_server_error() {
        let codec = RedisCodec::default();
        let err = codec
            .check_reply(Frame::Error("WRONGTYPE Operation against a key".into()))
            .unwrap_err();

        match err {
            PipelineError::Server(e) => {
                assert_eq!(Some("WRONGTYPE"), e.code());
                assert_eq!(Some("Operation against a key"), e.message());
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(codec.check_reply(Frame::Null).is_ok());
    }

    #[test]
    fn overflowing_bulk_length_is_rejected() {
        let mut codec = RedisCodec::default();
        let mut buf = BytesMut::from(&b"$18446744073709551615\r\n+OK\r\n"[..]);
        assert!(matches!(codec.decode(&mut buf), Err(ParseError::Parse(_))));
    }
}
