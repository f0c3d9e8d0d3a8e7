//! Shared utilities for integration testing.
#![allow(dead_code)]

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use cluster_master::detector::{
    DetectorEndpoint, DetectorError, DetectorFactory, EndpointError, MasterDetector,
};
use cluster_master::runtime::ProcessRuntime;
use cluster_master::{MasterClient, Pid};

/// Ordered record of what the fakes observed.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Arguments of one `DetectorFactory::create` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCall {
    pub endpoint: DetectorEndpoint,
    pub pid: Pid,
    pub contend: bool,
    pub quiet: bool,
}

/// Factory that records its calls and appoints the master like standalone mode.
#[derive(Clone, Default)]
pub struct RecordingFactory {
    pub journal: Journal,
    pub calls: Arc<Mutex<Vec<CreateCall>>>,
    pub clients: Arc<Mutex<Vec<MasterClient>>>,
    pub fail: bool,
}

impl RecordingFactory {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<CreateCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl DetectorFactory for RecordingFactory {
    type Detector = RecordingDetector;

    fn create(
        &self,
        endpoint: &DetectorEndpoint,
        master: &MasterClient,
        contend: bool,
        quiet: bool,
    ) -> Result<RecordingDetector, DetectorError> {
        self.calls.lock().unwrap().push(CreateCall {
            endpoint: endpoint.clone(),
            pid: master.pid().clone(),
            contend,
            quiet,
        });
        self.clients.lock().unwrap().push(master.clone());
        self.journal.push("detector.create");

        if self.fail {
            return Err(DetectorError::Endpoint(EndpointError::Unreadable {
                path: "/etc/master/zk".to_string(),
                reason: "injected".to_string(),
            }));
        }

        master.leader_detected(Some(master.pid().clone()));
        Ok(RecordingDetector {
            journal: self.journal.clone(),
            master: master.clone(),
        })
    }
}

pub struct RecordingDetector {
    journal: Journal,
    master: MasterClient,
}

impl MasterDetector for RecordingDetector {
    fn kind(&self) -> &'static str {
        "recording"
    }

    async fn destroy(self) {
        let state = if self.master.is_running() {
            "master running"
        } else {
            "master stopped"
        };
        self.journal.push(format!("detector.destroy ({state})"));
    }
}

pub async fn ephemeral_runtime() -> ProcessRuntime {
    ProcessRuntime::bind("master", "127.0.0.1:0".parse().unwrap())
        .await
        .unwrap()
}

/// Minimal HTTP/1.1 GET returning the status line and body.
pub async fn http_get(addr: SocketAddr, path: &str) -> (String, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    let (head, body) = response.split_once("\r\n\r\n").unwrap_or((&response, ""));
    let status = head.lines().next().unwrap_or_default().to_string();
    (status, body.to_string())
}

/// Poll `check` until it holds or ~2s pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// In-memory ZooKeeper speaking just enough of the protocol for the detector.
#[derive(Clone, Default)]
pub struct MockZooKeeper {
    nodes: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    sequence: Arc<Mutex<u32>>,
    stall: bool,
    pub journal: Journal,
}

const OP_CREATE: i32 = 1;
const OP_GET_DATA: i32 = 4;
const OP_GET_CHILDREN: i32 = 8;
const OP_PING: i32 = 11;
const OP_CLOSE: i32 = -11;
const OP_AUTH: i32 = 100;
const NODE_EXISTS: i32 = -110;
const NO_NODE: i32 = -101;

impl MockZooKeeper {
    /// Accepts sessions but never answers a request.
    pub fn stalled() -> Self {
        Self {
            stall: true,
            ..Self::default()
        }
    }

    /// Pre-populate a node, e.g. a member owned by another master.
    pub fn insert(&self, path: &str, data: &[u8]) {
        self.nodes
            .lock()
            .unwrap()
            .insert(path.to_string(), data.to_vec());
        let mut sequence = self.sequence.lock().unwrap();
        *sequence += 1;
    }

    pub fn contains(&self, path: &str) -> bool {
        self.nodes.lock().unwrap().contains_key(path)
    }

    pub async fn start(&self) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = self.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let server = server.clone();
                tokio::spawn(async move {
                    let _ = server.serve(socket).await;
                });
            }
        });
        addr
    }

    async fn serve(&self, mut socket: TcpStream) -> std::io::Result<()> {
        let _connect = read_frame(&mut socket).await?;
        let mut reply = BytesMut::new();
        reply.put_i32(0);
        reply.put_i32(6000);
        reply.put_i64(0x5eed);
        put_buffer(&mut reply, &[0u8; 16]);
        write_frame(&mut socket, &reply).await?;
        self.journal.push("connect");

        if self.stall {
            loop {
                read_frame(&mut socket).await?;
                self.journal.push("unanswered");
            }
        }

        let mut ephemeral = Vec::new();
        loop {
            let mut frame = read_frame(&mut socket).await?;
            let xid = frame.get_i32();
            let op = frame.get_i32();

            let mut body = BytesMut::new();
            let err = match op {
                OP_CREATE => {
                    let path = get_string(&mut frame);
                    let data = get_buffer(&mut frame);
                    let acl_len = frame.get_i32();
                    for _ in 0..acl_len {
                        frame.get_i32();
                        get_string(&mut frame);
                        get_string(&mut frame);
                    }
                    let mode = frame.get_i32();
                    self.create(path, data, mode, &mut ephemeral, &mut body)
                }
                OP_GET_CHILDREN => {
                    let path = get_string(&mut frame);
                    let children = self.children(&path);
                    body.put_i32(children.len() as i32);
                    for child in children {
                        put_buffer(&mut body, child.as_bytes());
                    }
                    0
                }
                OP_GET_DATA => {
                    let path = get_string(&mut frame);
                    match self.nodes.lock().unwrap().get(&path) {
                        Some(data) => {
                            put_buffer(&mut body, data);
                            0
                        }
                        None => NO_NODE,
                    }
                }
                OP_AUTH => {
                    self.journal.push("auth");
                    0
                }
                OP_PING => 0,
                OP_CLOSE => {
                    self.journal.push("close");
                    let mut nodes = self.nodes.lock().unwrap();
                    for path in ephemeral.drain(..) {
                        nodes.remove(&path);
                    }
                    0
                }
                _ => -6,
            };

            let mut reply = BytesMut::new();
            reply.put_i32(xid);
            reply.put_i64(1);
            reply.put_i32(err);
            reply.put_slice(&body);
            write_frame(&mut socket, &reply).await?;

            if op == OP_CLOSE {
                return Ok(());
            }
        }
    }

    fn create(
        &self,
        path: String,
        data: Vec<u8>,
        mode: i32,
        ephemeral: &mut Vec<String>,
        body: &mut BytesMut,
    ) -> i32 {
        let mut nodes = self.nodes.lock().unwrap();
        let path = if mode == 3 {
            let mut sequence = self.sequence.lock().unwrap();
            let path = format!("{path}{:010}", *sequence);
            *sequence += 1;
            ephemeral.push(path.clone());
            self.journal.push(format!("member {path}"));
            path
        } else if nodes.contains_key(&path) {
            return NODE_EXISTS;
        } else {
            path
        };
        nodes.insert(path.clone(), data);
        put_buffer(body, path.as_bytes());
        0
    }

    fn children(&self, parent: &str) -> Vec<String> {
        let prefix = format!("{parent}/");
        self.nodes
            .lock()
            .unwrap()
            .keys()
            .filter_map(|path| path.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect()
    }
}

async fn read_frame(socket: &mut TcpStream) -> std::io::Result<Bytes> {
    let len = socket.read_i32().await?;
    let mut payload = vec![0u8; len as usize];
    socket.read_exact(&mut payload).await?;
    Ok(Bytes::from(payload))
}

async fn write_frame(socket: &mut TcpStream, payload: &[u8]) -> std::io::Result<()> {
    socket.write_i32(payload.len() as i32).await?;
    socket.write_all(payload).await
}

fn put_buffer(buf: &mut BytesMut, value: &[u8]) {
    buf.put_i32(value.len() as i32);
    buf.put_slice(value);
}

fn get_buffer(buf: &mut Bytes) -> Vec<u8> {
    let len = buf.get_i32();
    if len < 0 {
        return Vec::new();
    }
    buf.split_to(len as usize).to_vec()
}

fn get_string(buf: &mut Bytes) -> String {
    String::from_utf8(get_buffer(buf)).unwrap()
}
