use std::time::Duration;

use bytes::Bytes;
use tokio_stream::StreamExt;

use wire_pipeline::client::Client;
use wire_pipeline::config::{Charset, Config};
use wire_pipeline::connection::frame::Frame;
use wire_pipeline::error::{ClientError, ConfigError, PipelineError};
use wire_pipeline::logger;

mod common;
use common::start_server;

/// 深度为 2 的管线上并发提交 SET / GET / GET，认证只执行一次且最先执行
#[tokio::test]
async fn set_then_get_with_password() {
    logger::init();

    let (stream, server) = start_server(Some("secret"));
    let config = Config::default()
        .with_pipeline_size(2)
        .with_password("secret");
    let client = Client::new(stream, config).unwrap();

    let set = client.submit(["SET", "a", "1"]).await.unwrap();
    let get = client.submit(["GET", "a"]).await.unwrap();
    let missing = client.submit(["GET", "missing"]).await.unwrap();

    assert_eq!(Frame::Simple("OK".into()), set.await.unwrap());
    assert_eq!(Frame::Bulk("1".into()), get.await.unwrap());
    assert_eq!(Frame::Null, missing.await.unwrap());

    assert_eq!(
        vec!["AUTH secret", "SET a 1", "GET a", "GET missing"],
        server.commands()
    );
}

/// 用户名、密码和数据库依次进入启动命令
#[tokio::test]
async fn user_and_database_are_selected_first() {
    let (stream, server) = start_server(Some("secret"));
    let config = Config::default()
        .with_user("alice")
        .with_password("secret")
        .with_database(3);
    let client = Client::new(stream, config).unwrap();

    assert_eq!(Bytes::from("PONG"), client.ping(None).await.unwrap());
    assert_eq!(
        vec!["AUTH alice secret", "SELECT 3", "PING"],
        server.commands()
    );
}

/// 密码错误时连接不可用
#[tokio::test]
async fn wrong_password_fails_every_command() {
    let (stream, server) = start_server(Some("secret"));
    let client = Client::new(stream, Config::default().with_password("nope")).unwrap();

    let failure = client.get("a").await.unwrap_err();
    assert!(matches!(failure.cause, PipelineError::Setup(_)));

    let failure = client.set("a", "1").await.unwrap_err();
    assert!(matches!(failure.cause, PipelineError::Setup(_)));

    assert!(matches!(client.closed().await, PipelineError::Setup(_)));
    assert_eq!(vec!["AUTH nope"], server.finished().await);
}

/// 常用命令
#[tokio::test]
async fn key_value_commands() {
    let (stream, _server) = start_server(None);
    let client = Client::new(stream, Config::default()).unwrap();

    assert_eq!(Bytes::from("hello"), client.ping(Some("hello".into())).await.unwrap());

    client.set("hello", "world").await.unwrap();
    client.set("n", 42).await.unwrap();
    client
        .set_expire("tmp", Bytes::from_static(b"\x00\x01"), Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(Some(Bytes::from("world")), client.get("hello").await.unwrap());
    assert_eq!(Some(Bytes::from("42")), client.get("n").await.unwrap());
    assert_eq!(
        Some(Bytes::from_static(b"\x00\x01")),
        client.get("tmp").await.unwrap()
    );

    assert_eq!(2, client.del(&["hello", "n", "nothing"]).await.unwrap());
    assert_eq!(None, client.get("hello").await.unwrap());
}

/// 服务端错误只影响对应命令
#[tokio::test]
async fn server_error_surfaces_to_its_caller() {
    let (stream, _server) = start_server(None);
    let client = Client::new(stream, Config::default()).unwrap();

    let failure = client.execute(["NOSUCH", "x"]).await.unwrap_err();
    match failure.cause() {
        PipelineError::Server(e) => {
            assert_eq!(Some("ERR"), e.code());
            assert_eq!(Some("unknown command 'NOSUCH'"), e.message());
        }
        other => panic!("unexpected cause {:?}", other),
    }
    assert!(failure.to_string().starts_with("fail to execute: NOSUCH x"));

    client.set("k", "v").await.unwrap();
}

/// SCAN 以流的形式遍历所有键
#[tokio::test]
async fn scan_walks_every_key() {
    let (stream, server) = start_server(None);
    let client = Client::new(stream, Config::default()).unwrap();

    for key in ["k1", "k2", "k3", "k4", "k5"] {
        client.set(key, key).await.unwrap();
    }

    let keys = client.scan(Some("k*".into()), Some(2));
    tokio::pin!(keys);

    let mut seen = Vec::new();
    while let Some(key) = keys.next().await {
        seen.push(key.unwrap());
    }
    seen.sort();

    let expected: Vec<Bytes> = ["k1", "k2", "k3", "k4", "k5"]
        .iter()
        .map(|k| Bytes::from(*k))
        .collect();
    assert_eq!(expected, seen);

    let scans: Vec<String> = server
        .commands()
        .into_iter()
        .filter(|c| c.starts_with("SCAN"))
        .collect();
    assert_eq!(
        vec![
            "SCAN 0 MATCH k* COUNT 2",
            "SCAN 2 MATCH k* COUNT 2",
            "SCAN 4 MATCH k* COUNT 2",
        ],
        scans
    );
}

/// 以 Latin-1 编码参数
#[tokio::test]
async fn latin1_charset() {
    let (stream, server) = start_server(None);
    let client = Client::new(stream, Config::default().with_charset(Charset::Latin1)).unwrap();

    client.set("k", "café").await.unwrap();
    assert_eq!(
        Some(Bytes::from_static(b"caf\xe9")),
        client.get("k").await.unwrap()
    );

    // 无法用 Latin-1 表示的字符在提交前失败，连接不受影响
    let failure = client.set("k", "日本").await.unwrap_err();
    assert!(matches!(failure.cause, PipelineError::Encode(_)));
    assert!(!client.is_closed());
    assert_eq!(2, server.commands().len());
}

/// 不等待应答的命令
#[tokio::test]
async fn send_detached_then_execute() {
    let (stream, server) = start_server(None);
    let client = Client::new(stream, Config::default()).unwrap();

    client.send_detached(["NOREPLY"]).await.unwrap();
    client.set("k", "v").await.unwrap();

    assert_eq!(vec!["NOREPLY", "SET k v"], server.commands());
}

/// 克隆的客户端在多个任务中并发使用
#[tokio::test]
async fn clients_are_shared_across_tasks() {
    let (stream, _server) = start_server(None);
    let client = Client::new(stream, Config::default().with_pipeline_size(3)).unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let key = format!("key{}", i);
            client.set(&key, i).await.unwrap();
            client.get(&key).await.unwrap()
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(Some(Bytes::from(i.to_string())), handle.await.unwrap());
    }
}

/// 正常关闭和取消
#[tokio::test]
async fn shutdown_and_close() {
    let (stream, server) = start_server(None);
    let client = Client::new(stream, Config::default()).unwrap();

    let pending = client.submit(["PING"]).await.unwrap();
    client.shutdown();
    assert_eq!(Frame::Simple("PONG".into()), pending.await.unwrap());
    assert!(matches!(client.closed().await, PipelineError::Closed));
    assert!(client.is_closed());

    // 已经终止后再取消不改变原因
    client.close();
    assert!(matches!(client.closed().await, PipelineError::Closed));
    assert_eq!(vec!["PING"], server.finished().await);
}

/// 管线深度为 0 的配置被拒绝
#[tokio::test]
async fn zero_pipeline_size_is_rejected() {
    let (stream, _server) = start_server(None);
    let result = Client::new(stream, Config::default().with_pipeline_size(0));

    assert!(matches!(
        result,
        Err(ClientError::Config(ConfigError::ZeroPipelineSize))
    ));
}
