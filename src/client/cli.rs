use std::time::Duration;

use bytes::Bytes;
use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::client::cmd::Arg;
use crate::config::{Charset, Config, Credentials};
use crate::connection::codec::RedisCodec;
use crate::connection::frame::Frame;
use crate::error::{ClientError, PipelineError, RequestFailure};
use crate::pipeline::{self, Pipeline, ResponseFuture};

/// Redis 客户端。
///
/// 所有克隆共享同一条管线化的连接，可以在多个任务中并发使用。
#[derive(Clone, Debug)]
pub struct Client {
    pub(crate) pipeline: Pipeline<RedisCodec>,
    pub(crate) charset: Charset,
}

impl Client {
    /// 在已经建立的双工流上创建客户端。
    ///
    /// 配置了密码时，先执行 `AUTH [user] password`；配置了数据库时再执行 `SELECT db`。
    pub fn new<S>(stream: S, config: Config) -> Result<Client, ClientError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        config.validate()?;

        let bootstrap = bootstrap_commands(&config.credentials, config.charset)
            .map_err(ClientError::Credentials)?;
        let codec = RedisCodec::new(config.charset);
        let pipeline = pipeline::spawn(stream, codec, bootstrap, config.pipeline_size);

        Ok(Client {
            pipeline,
            charset: config.charset,
        })
    }

    fn command<I, A>(&self, args: I) -> Result<Frame, RequestFailure>
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        let args: Vec<Arg> = args.into_iter().map(Into::into).collect();
        let parts = args
            .iter()
            .cloned()
            .map(|arg| arg.into_bytes(self.charset))
            .collect::<Result<Vec<Bytes>, _>>();

        match parts {
            Ok(parts) => Ok(Frame::command(parts)),
            Err(e) => Err(RequestFailure::new(
                format!("{:?}", args),
                PipelineError::Encode(e),
            )),
        }
    }

    /// 提交一条命令，返回等待应答的 future。请求队列满时挂起。
    pub async fn submit<I, A>(&self, args: I) -> Result<ResponseFuture<Frame>, RequestFailure>
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        let frame = self.command(args)?;
        let description = frame.to_string();
        debug!("submit request: {}", description);
        self.pipeline.submit_described(frame, description).await
    }

    /// 执行一条命令并等待应答。服务端的错误应答以 `PipelineError::Server` 返回。
    pub async fn execute<I, A>(&self, args: I) -> Result<Frame, RequestFailure>
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        self.submit(args).await?.await
    }

    /// 写出一条不等待应答的命令。
    ///
    /// 只适用于服务端不会应答的命令（例如 `CLIENT REPLY OFF` 之后）。
    pub async fn send_detached<I, A>(&self, args: I) -> Result<(), RequestFailure>
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        let frame = self.command(args)?;
        let description = frame.to_string();
        self.pipeline
            .send_detached(frame)
            .await
            .map_err(|cause| RequestFailure::new(description, cause))
    }

    pub async fn ping(&self, msg: Option<String>) -> Result<Bytes, RequestFailure> {
        let mut args = vec![Arg::from("PING")];
        args.extend(msg.map(Arg::from));

        match self.execute(args).await? {
            Frame::Simple(v) => Ok(v.into()),
            Frame::Bulk(v) => Ok(v),
            frame => Err(unexpected("PING", frame)),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<Bytes>, RequestFailure> {
        match self.execute([Arg::from("GET"), Arg::from(key)]).await? {
            Frame::Simple(v) => Ok(Some(v.into())),
            Frame::Bulk(v) => Ok(Some(v)),
            Frame::Null => Ok(None),
            frame => Err(unexpected("GET", frame)),
        }
    }

    pub async fn set(&self, key: &str, value: impl Into<Arg>) -> Result<(), RequestFailure> {
        let reply = self
            .execute([Arg::from("SET"), Arg::from(key), value.into()])
            .await?;
        expect_ok("SET", reply)
    }

    pub async fn set_expire(
        &self,
        key: &str,
        value: impl Into<Arg>,
        expiration: Duration,
    ) -> Result<(), RequestFailure> {
        let millis = i64::try_from(expiration.as_millis()).unwrap_or(i64::MAX);
        let reply = self
            .execute([
                Arg::from("SET"),
                Arg::from(key),
                value.into(),
                Arg::from("PX"),
                Arg::from(millis),
            ])
            .await?;
        expect_ok("SET", reply)
    }

    /// 删除键，返回实际删除的数量。
    pub async fn del(&self, keys: &[&str]) -> Result<i64, RequestFailure> {
        let mut args = vec![Arg::from("DEL")];
        args.extend(keys.iter().map(|&k| Arg::from(k)));

        match self.execute(args).await? {
            Frame::Integer(n) => Ok(n),
            frame => Err(unexpected("DEL", frame)),
        }
    }

    /// 正常关闭：已提交的命令完成后关闭连接。
    pub fn shutdown(&self) {
        self.pipeline.shutdown()
    }

    /// 立即取消：未完成的命令全部失败。
    pub fn close(&self) {
        self.pipeline.close()
    }

    pub fn is_closed(&self) -> bool {
        self.pipeline.is_closed()
    }

    /// 等待连接终止，返回终止原因。
    pub async fn closed(&self) -> PipelineError {
        self.pipeline.closed().await
    }
}

pub(crate) fn unexpected(command: &str, frame: Frame) -> RequestFailure {
    RequestFailure::new(command, PipelineError::UnexpectedReply(frame.to_string()))
}

fn expect_ok(command: &str, reply: Frame) -> Result<(), RequestFailure> {
    match reply {
        Frame::Simple(response) if response == "OK" => Ok(()),
        frame => Err(unexpected(command, frame)),
    }
}

/// 启动阶段的命令。
fn bootstrap_commands(
    credentials: &Credentials,
    charset: Charset,
) -> Result<Vec<Frame>, crate::error::ParseError> {
    let mut commands = Vec::new();

    if let Some(password) = &credentials.password {
        let mut args = vec![Bytes::from_static(b"AUTH")];
        if let Some(user) = &credentials.user {
            args.push(charset.encode(user)?);
        }
        args.push(charset.encode(password)?);
        commands.push(Frame::command(args));
    }

    if let Some(database) = &credentials.database {
        commands.push(Frame::command(vec![
            Bytes::from_static(b"SELECT"),
            charset.encode(database)?,
        ]));
    }

    Ok(commands)
}
