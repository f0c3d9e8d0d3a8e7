//! A single ZooKeeper session over one TCP connection.
//!
//! Requests are issued one at a time; watch notifications that arrive while
//! waiting for a reply are queued for [`ZkSession::next_event`].

use bytes::Bytes;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::zookeeper::proto::{
    self, code, xid, Acl, ConnectRequest, ConnectResponse, CreateMode, ReplyHeader, Request,
    WatchedEvent, MAX_FRAME_LEN,
};
use crate::zookeeper::ZkError;

pub struct ZkSession {
    writer: OwnedWriteHalf,
    frames: mpsc::Receiver<Result<Bytes, ZkError>>,
    reader: JoinHandle<()>,
    events: VecDeque<WatchedEvent>,
    next_xid: i32,
    session_id: i64,
    timeout: Duration,
    last_heard: Instant,
}

impl ZkSession {
    /// Connect to `server` and complete the session handshake.
    pub async fn connect(server: &str, timeout: Duration) -> Result<Self, ZkError> {
        let stream = time::timeout(timeout, TcpStream::connect(server))
            .await
            .map_err(|_| ZkError::Timeout)??;
        stream.set_nodelay(true)?;
        let (mut read_half, mut writer) = stream.into_split();

        let request = ConnectRequest {
            timeout_ms: i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX),
        };
        write_frame(&mut writer, &request.encode()).await?;

        let frame = time::timeout(timeout, read_frame(&mut read_half))
            .await
            .map_err(|_| ZkError::Timeout)??;
        let response = ConnectResponse::decode(frame)?;
        if response.timeout_ms <= 0 {
            return Err(ZkError::SessionExpired);
        }

        let negotiated = Duration::from_millis(response.timeout_ms as u64);
        let (tx, frames) = mpsc::channel(64);
        let reader = tokio::spawn(read_loop(read_half, tx));

        Ok(Self {
            writer,
            frames,
            reader,
            events: VecDeque::new(),
            next_xid: 1,
            session_id: response.session_id,
            timeout: negotiated,
            last_heard: Instant::now(),
        })
    }

    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    /// Negotiated session timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn authenticate(&mut self, scheme: &str, auth: Vec<u8>) -> Result<(), ZkError> {
        let request = Request::Auth {
            scheme: scheme.to_string(),
            auth,
        };
        self.call(xid::AUTH, request).await.map(|_| ())
    }

    pub async fn create(
        &mut self,
        path: &str,
        data: Vec<u8>,
        acl: Vec<Acl>,
        mode: CreateMode,
    ) -> Result<String, ZkError> {
        let request = Request::Create {
            path: path.to_string(),
            data,
            acl,
            mode,
        };
        let request_xid = self.allocate_xid();
        let mut body = self.call(request_xid, request).await?;
        proto::decode_created_path(&mut body)
    }

    /// Create `path` and its parents as persistent nodes, tolerating existing ones.
    pub async fn ensure_path(&mut self, path: &str, acl: &[Acl]) -> Result<(), ZkError> {
        let mut prefix = String::new();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            prefix.push('/');
            prefix.push_str(component);
            match self
                .create(&prefix, Vec::new(), acl.to_vec(), CreateMode::Persistent)
                .await
            {
                Ok(_) | Err(ZkError::Server(code::NODE_EXISTS)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    pub async fn get_children(&mut self, path: &str, watch: bool) -> Result<Vec<String>, ZkError> {
        let request = Request::GetChildren {
            path: path.to_string(),
            watch,
        };
        let request_xid = self.allocate_xid();
        let mut body = self.call(request_xid, request).await?;
        proto::decode_children(&mut body)
    }

    pub async fn get_data(&mut self, path: &str, watch: bool) -> Result<Vec<u8>, ZkError> {
        let request = Request::GetData {
            path: path.to_string(),
            watch,
        };
        let request_xid = self.allocate_xid();
        let mut body = self.call(request_xid, request).await?;
        proto::decode_data(&mut body)
    }

    /// Wait for the next watch notification, pinging while idle.
    pub async fn next_event(&mut self) -> Result<WatchedEvent, ZkError> {
        if let Some(event) = self.events.pop_front() {
            return Ok(event);
        }

        let ping_interval = self.timeout / 3;
        loop {
            if self.last_heard.elapsed() > self.timeout {
                return Err(ZkError::Timeout);
            }

            tokio::select! {
                frame = self.frames.recv() => {
                    let mut frame = frame.ok_or(ZkError::ConnectionLost)??;
                    self.last_heard = Instant::now();
                    let header = ReplyHeader::decode(&mut frame)?;
                    match header.xid {
                        xid::WATCH => return WatchedEvent::decode(&mut frame),
                        xid::PING => {}
                        other => {
                            tracing::debug!(xid = other, "Ignoring unsolicited ZooKeeper reply")
                        }
                    }
                }
                _ = time::sleep(ping_interval) => {
                    write_frame(&mut self.writer, &Request::Ping.encode(xid::PING)).await?;
                }
            }
        }
    }

    /// Close the session so its ephemeral nodes disappear immediately.
    pub async fn close(mut self) -> Result<(), ZkError> {
        let request_xid = self.allocate_xid();
        let result = self.call(request_xid, Request::Close).await.map(|_| ());
        let _ = self.writer.shutdown().await;
        result
    }

    fn allocate_xid(&mut self) -> i32 {
        let current = self.next_xid;
        self.next_xid = self.next_xid.checked_add(1).unwrap_or(1);
        current
    }

    /// Send `request` and wait for the reply carrying the same xid.
    async fn call(&mut self, request_xid: i32, request: Request) -> Result<Bytes, ZkError> {
        write_frame(&mut self.writer, &request.encode(request_xid)).await?;

        loop {
            let mut frame = time::timeout(self.timeout, self.frames.recv())
                .await
                .map_err(|_| ZkError::Timeout)?
                .ok_or(ZkError::ConnectionLost)??;
            self.last_heard = Instant::now();

            let header = ReplyHeader::decode(&mut frame)?;
            match header.xid {
                xid::WATCH => self.events.push_back(WatchedEvent::decode(&mut frame)?),
                xid::PING => {}
                reply if reply == request_xid => {
                    return match header.err {
                        code::OK => Ok(frame),
                        code::SESSION_EXPIRED => Err(ZkError::SessionExpired),
                        code::AUTH_FAILED => Err(ZkError::AuthFailed),
                        err => Err(ZkError::Server(err)),
                    };
                }
                other => tracing::debug!(xid = other, "Ignoring out-of-order ZooKeeper reply"),
            }
        }
    }
}

impl Drop for ZkSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(mut reader: OwnedReadHalf, tx: mpsc::Sender<Result<Bytes, ZkError>>) {
    loop {
        let frame = read_frame(&mut reader).await;
        let failed = frame.is_err();
        if tx.send(frame).await.is_err() || failed {
            break;
        }
    }
}

async fn read_frame(reader: &mut OwnedReadHalf) -> Result<Bytes, ZkError> {
    let len = reader.read_i32().await?;
    if len < 0 || len as usize > MAX_FRAME_LEN {
        return Err(ZkError::Protocol(format!("invalid frame length {len}")));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(Bytes::from(payload))
}

async fn write_frame(writer: &mut OwnedWriteHalf, payload: &Bytes) -> Result<(), ZkError> {
    writer.write_i32(payload.len() as i32).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}
