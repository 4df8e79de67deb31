//! In-process object store speaking the word protocol over TCP.
//!
//! Objects live in shared state, so they survive reconnects the same way a
//! real store's do. Failures can be injected per opcode.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crudfs_client::protocol::{build_frame, flags, Opcode, Word, WORD_SIZE};
use crudfs_client::CrudFs;

/// What the store does with one request.
enum Reply {
    Respond(Word, Vec<u8>),
    HangUp,
    Stall,
}

struct StoreState {
    objects: HashMap<u32, Vec<u8>>,
    priority: Option<Vec<u8>>,
    next_oid: u32,
    fail: Vec<Opcode>,
    hang_up: Vec<Opcode>,
    stall: Vec<Opcode>,
    requests: Vec<Opcode>,
    connections: usize,
}

impl StoreState {
    fn new() -> Self {
        Self {
            objects: HashMap::new(),
            priority: None,
            next_oid: 1,
            fail: Vec::new(),
            hang_up: Vec::new(),
            stall: Vec::new(),
            requests: Vec::new(),
            connections: 0,
        }
    }

    fn apply(&mut self, word: Word, payload: Vec<u8>) -> Reply {
        let opcode = word.opcode;
        self.requests.push(opcode);

        if take(&mut self.hang_up, opcode) {
            return Reply::HangUp;
        }
        if take(&mut self.stall, opcode) {
            return Reply::Stall;
        }

        let failure = Reply::Respond(Word::new(word.oid, opcode, 0, flags::FAILURE), Vec::new());
        if take(&mut self.fail, opcode) {
            return failure;
        }

        let ok = |oid| Reply::Respond(Word::new(oid, opcode, 0, flags::NONE), Vec::new());
        let priority = flags::has_flag(word.flags, flags::PRIORITY_OBJECT);

        match opcode {
            Opcode::Init | Opcode::Close => ok(0),
            Opcode::Format => {
                self.objects.clear();
                self.priority = None;
                self.next_oid = 1;
                ok(0)
            }
            Opcode::Create if priority => {
                self.priority = Some(payload);
                ok(0)
            }
            Opcode::Create => {
                let oid = self.next_oid;
                self.next_oid += 1;
                self.objects.insert(oid, payload);
                ok(oid)
            }
            Opcode::Read => {
                let object = if priority {
                    self.priority.as_ref()
                } else {
                    self.objects.get(&word.oid)
                };
                match object {
                    Some(data) => Reply::Respond(
                        Word::new(word.oid, opcode, data.len() as u32, flags::NONE),
                        data.clone(),
                    ),
                    None => failure,
                }
            }
            Opcode::Update if priority => {
                self.priority = Some(payload);
                ok(word.oid)
            }
            Opcode::Update => match self.objects.get_mut(&word.oid) {
                Some(slot) => {
                    *slot = payload;
                    ok(word.oid)
                }
                None => failure,
            },
            Opcode::Delete => match self.objects.remove(&word.oid) {
                Some(_) => ok(word.oid),
                None => failure,
            },
        }
    }
}

/// Remove the first `opcode` from `queue`, reporting whether it was there.
fn take(queue: &mut Vec<Opcode>, opcode: Opcode) -> bool {
    match queue.iter().position(|&o| o == opcode) {
        Some(i) => {
            queue.remove(i);
            true
        }
        None => false,
    }
}

/// Handle to a running mock store.
#[derive(Clone)]
pub struct MockStore {
    addr: String,
    state: Arc<Mutex<StoreState>>,
}

impl MockStore {
    /// Bind to an ephemeral port and start accepting connections.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let state = Arc::new(Mutex::new(StoreState::new()));

        let accept_state = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_state.lock().unwrap().connections += 1;
                tokio::spawn(serve(stream, accept_state.clone()));
            }
        });

        Self { addr, state }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// A client pointed at this store.
    pub fn client(&self) -> CrudFs {
        CrudFs::builder().server_addr(self.addr.clone()).build()
    }

    pub fn object(&self, oid: u32) -> Option<Vec<u8>> {
        self.state.lock().unwrap().objects.get(&oid).cloned()
    }

    pub fn contains(&self, oid: u32) -> bool {
        self.state.lock().unwrap().objects.contains_key(&oid)
    }

    /// Number of ordinary (non-priority) objects.
    pub fn object_count(&self) -> usize {
        self.state.lock().unwrap().objects.len()
    }

    pub fn priority_object(&self) -> Option<Vec<u8>> {
        self.state.lock().unwrap().priority.clone()
    }

    /// Answer the next `opcode` request with a failure result.
    pub fn fail_next(&self, opcode: Opcode) {
        self.state.lock().unwrap().fail.push(opcode);
    }

    /// Drop the connection instead of answering the next `opcode` request.
    pub fn hang_up_on(&self, opcode: Opcode) {
        self.state.lock().unwrap().hang_up.push(opcode);
    }

    /// Never answer the next `opcode` request.
    pub fn stall_on(&self, opcode: Opcode) {
        self.state.lock().unwrap().stall.push(opcode);
    }

    /// Opcodes received so far, in order.
    pub fn requests(&self) -> Vec<Opcode> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn connections(&self) -> usize {
        self.state.lock().unwrap().connections
    }
}

async fn serve(mut stream: TcpStream, state: Arc<Mutex<StoreState>>) {
    loop {
        let mut raw = [0u8; WORD_SIZE];
        if stream.read_exact(&mut raw).await.is_err() {
            return;
        }
        let word = Word::unpack(u64::from_be_bytes(raw)).unwrap();

        let payload_len = if word.opcode.carries_request_payload() {
            word.length as usize
        } else {
            0
        };
        let mut payload = vec![0u8; payload_len];
        if stream.read_exact(&mut payload).await.is_err() {
            return;
        }

        let reply = {
            let mut state = state.lock().unwrap();
            state.apply(word, payload)
        };

        match reply {
            Reply::Respond(response, body) => {
                if stream.write_all(&build_frame(&response, &body)).await.is_err() {
                    return;
                }
                if response.opcode == Opcode::Close {
                    let _ = stream.shutdown().await;
                    return;
                }
            }
            Reply::HangUp => return,
            Reply::Stall => std::future::pending::<()>().await,
        }
    }
}
