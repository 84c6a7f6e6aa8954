use async_stream::try_stream;
use bytes::Bytes;
use log::debug;
use tokio_stream::Stream;

use crate::client::cli::{unexpected, Client};
use crate::client::cmd::Arg;
use crate::connection::frame::Frame;
use crate::error::RequestFailure;

impl Client {
    /// 用 `SCAN` 遍历键空间，游标回到 0 时结束。
    ///
    /// 每一批都是一次普通的管线请求，可以和其他命令交错执行。
    pub fn scan(
        &self,
        pattern: Option<String>,
        count: Option<usize>,
    ) -> impl Stream<Item = Result<Bytes, RequestFailure>> {
        let client = self.clone();

        try_stream! {
            let mut cursor = 0u64;
            loop {
                let (next, keys) = client.scan_step(cursor, pattern.as_deref(), count).await?;
                debug!("scan cursor {} -> {}, {} keys", cursor, next, keys.len());

                for key in keys {
                    yield key;
                }

                if next == 0 {
                    break;
                }
                cursor = next;
            }
        }
    }

    async fn scan_step(
        &self,
        cursor: u64,
        pattern: Option<&str>,
        count: Option<usize>,
    ) -> Result<(u64, Vec<Bytes>), RequestFailure> {
        let reply = self.execute(scan_args(cursor, pattern, count)).await?;
        parse_scan_reply(reply)
    }
}

fn scan_args(cursor: u64, pattern: Option<&str>, count: Option<usize>) -> Vec<Arg> {
    let mut args = vec![Arg::from("SCAN"), Arg::from(cursor)];
    if let Some(pattern) = pattern {
        args.push(Arg::from("MATCH"));
        args.push(Arg::from(pattern));
    }
    if let Some(count) = count {
        args.push(Arg::from("COUNT"));
        args.push(Arg::from(count));
    }
    args
}

fn parse_scan_reply(reply: Frame) -> Result<(u64, Vec<Bytes>), RequestFailure> {
    let mut parts = match reply {
        Frame::Array(parts) if parts.len() == 2 => parts,
        frame => return Err(unexpected("SCAN", frame)),
    };

    let keys = parts.pop();
    let cursor = parts.pop();

    let cursor = match cursor {
        Some(Frame::Bulk(raw)) => atoi::atoi::<u64>(&raw),
        Some(Frame::Integer(n)) => u64::try_from(n).ok(),
        _ => None,
    };

    match (cursor, keys) {
        (Some(cursor), Some(Frame::Array(keys))) => {
            let keys = keys
                .into_iter()
                .map(|key| match key {
                    Frame::Bulk(key) => Ok(key),
                    Frame::Simple(key) => Ok(Bytes::from(key)),
                    frame => Err(unexpected("SCAN", frame)),
                })
                .collect::<Result<Vec<Bytes>, RequestFailure>>()?;
            Ok((cursor, keys))
        }
        (_, keys) => Err(unexpected(
            "SCAN",
            keys.unwrap_or(Frame::Null),
        )),
    }
}
