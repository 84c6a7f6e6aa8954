//! 测试用的内存 Redis 服务器，运行在 `tokio::io::duplex` 的另一端。

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::io::DuplexStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use wire_pipeline::connection::codec::RedisCodec;
use wire_pipeline::connection::connect::{FrameReader, FrameWriter};
use wire_pipeline::connection::frame::Frame;

/// duplex 管道的缓冲区大小，足够容纳测试中所有未读的请求
pub const BUFFER: usize = 64 * 1024;

pub struct MockServer {
    commands: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl MockServer {
    /// 到目前为止收到的命令
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// 等待客户端断开，返回收到的全部命令。
    pub async fn finished(self) -> Vec<String> {
        let MockServer { commands, handle } = self;
        handle.await.unwrap();
        let commands = commands.lock().unwrap().clone();
        commands
    }
}

/// 启动一个立即开始服务的服务器。
pub fn start_server(password: Option<&str>) -> (DuplexStream, MockServer) {
    start_gated(password, None)
}

/// 启动服务器，`gate` 完成之前不读取任何请求。
pub fn start_gated(
    password: Option<&str>,
    gate: Option<oneshot::Receiver<()>>,
) -> (DuplexStream, MockServer) {
    let (client, server) = tokio::io::duplex(BUFFER);
    let commands = Arc::new(Mutex::new(Vec::new()));

    let handle = tokio::spawn(serve(
        server,
        password.map(str::to_string),
        gate,
        commands.clone(),
    ));

    (client, MockServer { commands, handle })
}

async fn serve(
    stream: DuplexStream,
    password: Option<String>,
    gate: Option<oneshot::Receiver<()>>,
    commands: Arc<Mutex<Vec<String>>>,
) {
    if let Some(gate) = gate {
        let _ = gate.await;
    }

    let (rd, wr) = tokio::io::split(stream);
    let mut reader = FrameReader::new(rd, RedisCodec::default());
    let mut writer = FrameWriter::new(wr, RedisCodec::default());

    let mut db: HashMap<Bytes, Bytes> = HashMap::new();
    let mut authenticated = password.is_none();

    while let Ok(Some(frame)) = reader.read_frame().await {
        let args: Vec<Bytes> = match frame {
            Frame::Array(parts) => parts
                .into_iter()
                .filter_map(|part| match part {
                    Frame::Bulk(b) => Some(b),
                    _ => None,
                })
                .collect(),
            _ => break,
        };
        if args.is_empty() {
            break;
        }

        commands
            .lock()
            .unwrap()
            .push(Frame::command(args.clone()).to_string());

        let name = String::from_utf8_lossy(&args[0]).to_uppercase();

        let reply = if name == "AUTH" {
            let given = args.last().cloned().unwrap_or_default();
            if password.as_deref().map(str::as_bytes) == Some(&given[..]) {
                authenticated = true;
                Some(ok())
            } else {
                Some(Frame::Error(
                    "WRONGPASS invalid username-password pair".into(),
                ))
            }
        } else if !authenticated {
            Some(Frame::Error("NOAUTH Authentication required.".into()))
        } else {
            match name.as_str() {
                "PING" => Some(match args.get(1) {
                    Some(msg) => Frame::Bulk(msg.clone()),
                    None => Frame::Simple("PONG".into()),
                }),
                "SELECT" => Some(ok()),
                "SET" => {
                    db.insert(args[1].clone(), args[2].clone());
                    Some(ok())
                }
                "GET" => Some(match db.get(&args[1]) {
                    Some(value) => Frame::Bulk(value.clone()),
                    None => Frame::Null,
                }),
                "DEL" => {
                    let removed = args[1..].iter().filter(|k| db.remove(*k).is_some()).count();
                    Some(Frame::Integer(removed as i64))
                }
                "SCAN" => Some(scan(&db, &args)),
                // 记录但不应答
                "NOREPLY" => None,
                _ => Some(Frame::Error(format!("ERR unknown command '{}'", name))),
            }
        };

        if let Some(reply) = reply {
            if writer.write_frame(&reply).await.is_err() {
                break;
            }
        }
    }
}

fn ok() -> Frame {
    Frame::Simple("OK".into())
}

// 每批返回两个键，游标是下一批的起始下标
fn scan(db: &HashMap<Bytes, Bytes>, args: &[Bytes]) -> Frame {
    let mut keys: Vec<&Bytes> = db.keys().collect();
    keys.sort();

    let start: usize = String::from_utf8_lossy(&args[1]).parse().unwrap_or(0);
    let end = (start + 2).min(keys.len());
    let next = if end >= keys.len() { 0 } else { end };

    let batch = keys[start.min(end)..end]
        .iter()
        .map(|k| Frame::Bulk((*k).clone()))
        .collect();

    Frame::Array(vec![
        Frame::Bulk(Bytes::from(next.to_string())),
        Frame::Array(batch),
    ])
}
