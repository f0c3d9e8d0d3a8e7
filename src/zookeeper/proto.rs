//! ZooKeeper wire records (jute encoding, big-endian, length-framed).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::zookeeper::ZkError;

/// Operation codes used by the master.
pub mod op {
    pub const CREATE: i32 = 1;
    pub const GET_DATA: i32 = 4;
    pub const GET_CHILDREN: i32 = 8;
    pub const PING: i32 = 11;
    pub const CLOSE: i32 = -11;
    pub const AUTH: i32 = 100;
}

/// Reserved transaction ids.
pub mod xid {
    pub const WATCH: i32 = -1;
    pub const PING: i32 = -2;
    pub const AUTH: i32 = -4;
}

/// Server error codes the master reacts to.
pub mod code {
    pub const OK: i32 = 0;
    pub const NO_NODE: i32 = -101;
    pub const NODE_EXISTS: i32 = -110;
    pub const SESSION_EXPIRED: i32 = -112;
    pub const AUTH_FAILED: i32 = -115;
}

/// Largest frame accepted from a server.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const PERM_ALL: i32 = 31;

/// Node creation mode flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    Persistent = 0,
    EphemeralSequential = 3,
}

/// Access control entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acl {
    pub perms: i32,
    pub scheme: String,
    pub id: String,
}

impl Acl {
    /// `world:anyone` with every permission.
    pub fn open() -> Vec<Acl> {
        vec![Acl {
            perms: PERM_ALL,
            scheme: "world".to_string(),
            id: "anyone".to_string(),
        }]
    }

    /// Every permission for the authenticated creator only.
    pub fn creator_all() -> Vec<Acl> {
        vec![Acl {
            perms: PERM_ALL,
            scheme: "auth".to_string(),
            id: String::new(),
        }]
    }
}

/// Client requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Create {
        path: String,
        data: Vec<u8>,
        acl: Vec<Acl>,
        mode: CreateMode,
    },
    GetData {
        path: String,
        watch: bool,
    },
    GetChildren {
        path: String,
        watch: bool,
    },
    Auth {
        scheme: String,
        auth: Vec<u8>,
    },
    Ping,
    Close,
}

impl Request {
    pub fn opcode(&self) -> i32 {
        match self {
            Request::Create { .. } => op::CREATE,
            Request::GetData { .. } => op::GET_DATA,
            Request::GetChildren { .. } => op::GET_CHILDREN,
            Request::Auth { .. } => op::AUTH,
            Request::Ping => op::PING,
            Request::Close => op::CLOSE,
        }
    }

    /// Encode header and body into a frame payload.
    pub fn encode(&self, xid: i32) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_i32(xid);
        buf.put_i32(self.opcode());

        match self {
            Request::Create { path, data, acl, mode } => {
                put_string(&mut buf, path);
                put_buffer(&mut buf, data);
                buf.put_i32(acl.len() as i32);
                for entry in acl {
                    buf.put_i32(entry.perms);
                    put_string(&mut buf, &entry.scheme);
                    put_string(&mut buf, &entry.id);
                }
                buf.put_i32(*mode as i32);
            }
            Request::GetData { path, watch } | Request::GetChildren { path, watch } => {
                put_string(&mut buf, path);
                buf.put_u8(u8::from(*watch));
            }
            Request::Auth { scheme, auth } => {
                buf.put_i32(0);
                put_string(&mut buf, scheme);
                put_buffer(&mut buf, auth);
            }
            Request::Ping | Request::Close => {}
        }

        buf.freeze()
    }
}

/// Session handshake sent on a fresh connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub timeout_ms: i32,
}

impl ConnectRequest {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(44);
        buf.put_i32(0); // protocol version
        buf.put_i64(0); // last zxid seen
        buf.put_i32(self.timeout_ms);
        buf.put_i64(0); // session id
        put_buffer(&mut buf, &[0u8; 16]);
        buf.freeze()
    }
}

/// Server reply to the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResponse {
    pub timeout_ms: i32,
    pub session_id: i64,
}

impl ConnectResponse {
    pub fn decode(mut buf: Bytes) -> Result<Self, ZkError> {
        need(&buf, 16)?;
        let _protocol_version = buf.get_i32();
        let timeout_ms = buf.get_i32();
        let session_id = buf.get_i64();
        let _password = get_buffer(&mut buf)?;
        Ok(Self { timeout_ms, session_id })
    }
}

/// Header preceding every non-handshake reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyHeader {
    pub xid: i32,
    pub zxid: i64,
    pub err: i32,
}

impl ReplyHeader {
    pub fn decode(buf: &mut Bytes) -> Result<Self, ZkError> {
        need(buf, 16)?;
        Ok(Self {
            xid: buf.get_i32(),
            zxid: buf.get_i64(),
            err: buf.get_i32(),
        })
    }
}

/// Notification delivered with `xid::WATCH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedEvent {
    pub kind: i32,
    pub state: i32,
    pub path: String,
}

impl WatchedEvent {
    pub fn decode(buf: &mut Bytes) -> Result<Self, ZkError> {
        need(buf, 8)?;
        let kind = buf.get_i32();
        let state = buf.get_i32();
        let path = get_string(buf)?;
        Ok(Self { kind, state, path })
    }
}

pub fn decode_children(buf: &mut Bytes) -> Result<Vec<String>, ZkError> {
    need(buf, 4)?;
    let count = buf.get_i32();
    if count < 0 {
        return Ok(Vec::new());
    }
    (0..count).map(|_| get_string(buf)).collect()
}

/// Node data; the trailing stat record is ignored.
pub fn decode_data(buf: &mut Bytes) -> Result<Vec<u8>, ZkError> {
    get_buffer(buf)
}

pub fn decode_created_path(buf: &mut Bytes) -> Result<String, ZkError> {
    get_string(buf)
}

fn put_string(buf: &mut BytesMut, value: &str) {
    put_buffer(buf, value.as_bytes());
}

fn put_buffer(buf: &mut BytesMut, value: &[u8]) {
    buf.put_i32(value.len() as i32);
    buf.put_slice(value);
}

fn get_buffer(buf: &mut Bytes) -> Result<Vec<u8>, ZkError> {
    need(buf, 4)?;
    let len = buf.get_i32();
    if len < 0 {
        return Ok(Vec::new());
    }
    let len = len as usize;
    need(buf, len)?;
    Ok(buf.split_to(len).to_vec())
}

fn get_string(buf: &mut Bytes) -> Result<String, ZkError> {
    let raw = get_buffer(buf)?;
    String::from_utf8(raw).map_err(|_| ZkError::Protocol("string is not UTF-8".to_string()))
}

fn need(buf: &Bytes, len: usize) -> Result<(), ZkError> {
    if buf.remaining() < len {
        return Err(ZkError::Protocol(format!(
            "truncated record: need {len} bytes, have {}",
            buf.remaining()
        )));
    }
    Ok(())
}
