//! In-memory server fixture shared by the integration tests.
//!
//! Implements the crate's `Transport` seam with a small stateful server: it
//! answers the JSON commands, stores uploaded ciphertext, serves chunk
//! ranges, and lets tests inject transient failures or corrupt stored
//! bytes. All wire blobs are fabricated with the crate's own primitives, so
//! every test exercises the real crypto path end to end.

#![allow(dead_code)]

use async_trait::async_trait;
use megalite::api::Transport;
use megalite::crypto::attrs::{self, Attributes};
use megalite::crypto::{b64, cipher, kdf, mac};
use megalite::crypto::words::{to_bytes, to_words};
use megalite::fs::node::NodeMeta;
use megalite::libs::error::{Error, Result};
use megalite::transfer::schedule::chunk_ranges;
use megalite::{Config, Mega};
use num_bigint::BigUint;
use parking_lot::Mutex;
use rand::RngCore;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Fixture account credentials.
pub const EMAIL: &str = "user@example.com";
pub const PASSWORD: &str = "password";

/// Owner id the fixture assigns to the account's own nodes.
pub const OWNER: &str = "usr0";

/// Fixed timestamp stamped on fabricated node records.
const FIXED_TS: i64 = 1_700_000_000;

/// One reserved upload slot.
pub struct Slot {
    pub size: u64,
    pub buf: Vec<u8>,
    pub received: u64,
    pub handle: String,
}

/// Mutable server state behind the transport.
pub struct State {
    pub passkey: [u8; 16],
    pub master_key: [u8; 16],
    pub expected_uh: String,
    pub session_plain: Vec<u8>,
    pub k_wire: String,
    pub privk_wire: String,
    pub csid_wire: String,
    /// Manifest node records, served verbatim by the `f` command.
    pub nodes: Vec<Value>,
    /// Manifest `ok` entries (wrapped share keys).
    pub ok: Vec<Value>,
    /// Stored ciphertext by node handle.
    pub files: HashMap<String, Vec<u8>>,
    /// Reserved upload slots by id.
    pub slots: HashMap<u64, Slot>,
    pub next_id: u64,
    /// URLs of every JSON request, for sequencing assertions.
    pub requests: Vec<String>,
    /// Answer this many JSON requests with the "try again" code first.
    pub eagain_budget: u32,
    /// Fail this many JSON requests at the transport level first.
    pub fail_json: u32,
    /// Fail this many chunk fetches at the transport level first.
    pub fail_chunks: u32,
    /// Flip one stored byte of `(handle, index)` when serving chunks.
    pub corrupt: Option<(String, usize)>,
}

pub struct MockServer {
    pub state: Mutex<State>,
}

impl MockServer {
    /// Builds a server with a valid account and the three distinguished
    /// roots, ready for `login` + `refresh`.
    pub fn new() -> Arc<Self> {
        let passkey = kdf::password_key(PASSWORD);
        let expected_uh = kdf::stringhash(EMAIL, &passkey);
        let mut master_key = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut master_key);

        // RSA material: two Mersenne primes and an arbitrary exponent. The
        // challenge plaintext is simply whatever c^d mod pq comes out to;
        // the session id is its leading 43 bytes.
        let p = (BigUint::from(1u8) << 521) - 1u8;
        let q = (BigUint::from(1u8) << 607) - 1u8;
        let d = BigUint::from(65537u32);
        let n = &p * &q;
        let c = BigUint::from_bytes_be(&[0x42u8; 96]);
        let session_plain = c.modpow(&d, &n).to_bytes_be();

        let mut k_buf = master_key.to_vec();
        cipher::ecb_encrypt(&passkey, &mut k_buf);

        let mut privk = Vec::new();
        privk.extend(mpi(&p));
        privk.extend(mpi(&q));
        privk.extend(mpi(&d));
        privk.extend(mpi(&BigUint::from(1u8)));
        privk.resize(privk.len().div_ceil(16) * 16, 0);
        cipher::ecb_encrypt(&master_key, &mut privk);

        let state = State {
            passkey,
            master_key,
            expected_uh,
            k_wire: b64::encode(&k_buf),
            privk_wire: b64::encode(&privk),
            csid_wire: b64::encode(&mpi(&c)),
            session_plain,
            nodes: vec![
                json!({"h": "root1", "t": 2, "u": OWNER, "ts": FIXED_TS}),
                json!({"h": "inbox1", "t": 3, "u": OWNER, "ts": FIXED_TS}),
                json!({"h": "trash1", "t": 4, "u": OWNER, "ts": FIXED_TS}),
            ],
            ok: Vec::new(),
            files: HashMap::new(),
            slots: HashMap::new(),
            next_id: 1,
            requests: Vec::new(),
            eagain_budget: 0,
            fail_json: 0,
            fail_chunks: 0,
            corrupt: None,
        };
        Arc::new(Self { state: Mutex::new(state) })
    }

    /// The session id a correct login must derive.
    pub fn expected_session_id(&self) -> String {
        b64::encode(&self.state.lock().session_plain[..43])
    }

    /// Seeds an owned folder record; returns its key.
    pub fn add_folder(&self, handle: &str, parent: &str, name: &str) -> [u8; 16] {
        let mut key = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut key);
        let mut state = self.state.lock();
        let attr = attrs::encode(&key, &Attributes { name: name.to_string() }).unwrap();
        let mut wrapped = key.to_vec();
        cipher::ecb_encrypt(&state.master_key, &mut wrapped);
        state.nodes.push(json!({
            "h": handle,
            "p": parent,
            "u": OWNER,
            "t": 1,
            "a": b64::encode(&attr),
            "k": format!("{OWNER}:{}", b64::encode(&wrapped)),
            "ts": FIXED_TS,
        }));
        key
    }

    /// Seeds an owned file record with real ciphertext and a correct
    /// composite key; returns the effective content key.
    pub fn add_file(&self, handle: &str, parent: &str, name: &str, content: &[u8]) -> [u8; 16] {
        let mut key = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut key);
        let mut iv = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut iv[..8]);

        let mut fold = mac::MacFold::new(&key);
        for (start, len) in chunk_ranges(content.len() as u64) {
            let chunk = &content[start as usize..(start + len) as usize];
            fold.absorb(&mac::chunk_mac(&key, &iv, chunk));
        }
        let meta_mac = fold.finish();

        let kw = to_words(&key);
        let ivw = to_words(&iv);
        let mw = to_words(&meta_mac);
        let compkey = to_bytes(&[
            kw[0] ^ ivw[0],
            kw[1] ^ ivw[1],
            kw[2] ^ mw[0],
            kw[3] ^ mw[1],
            ivw[0],
            ivw[1],
            mw[0],
            mw[1],
        ]);

        let mut ciphertext = content.to_vec();
        cipher::ctr_transform(&key, &iv, 0, &mut ciphertext);

        let mut state = self.state.lock();
        let attr = attrs::encode(&key, &Attributes { name: name.to_string() }).unwrap();
        let mut wrapped = compkey;
        cipher::ecb_encrypt(&state.master_key, &mut wrapped);
        state.files.insert(handle.to_string(), ciphertext);
        state.nodes.push(json!({
            "h": handle,
            "p": parent,
            "u": OWNER,
            "t": 0,
            "a": b64::encode(&attr),
            "k": format!("{OWNER}:{}", b64::encode(&wrapped)),
            "s": content.len() as u64,
            "ts": FIXED_TS,
        }));
        key
    }

    /// Seeds an incoming share: a shared root folder (carrying its wrapped
    /// share key) followed by a file descendant whose key unwraps through
    /// the root's share key. Returns `(root_handle, child_handle)`.
    pub fn add_shared_tree(&self, root_name: &str, child_name: &str) -> (String, String) {
        let mut share_key = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut share_key);
        let mut folder_key = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut folder_key);
        let mut compkey = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut compkey);

        let mut state = self.state.lock();
        let mut sk_wrapped = share_key.to_vec();
        cipher::ecb_encrypt(&state.master_key, &mut sk_wrapped);
        let sk_wire = b64::encode(&sk_wrapped);

        let root_attr = attrs::encode(&folder_key, &Attributes { name: root_name.to_string() }).unwrap();
        let mut root_key = folder_key.to_vec();
        cipher::ecb_encrypt(&share_key, &mut root_key);
        state.nodes.push(json!({
            "h": "sr1",
            "p": "",
            "u": "usr9",
            "t": 1,
            "a": b64::encode(&root_attr),
            "k": format!("usr9:{}", b64::encode(&root_key)),
            "su": "usr9",
            "sk": sk_wire,
            "ts": FIXED_TS,
        }));

        let child_meta = NodeMeta::from_composite(&compkey);
        let mut child_key = [0u8; 16];
        child_key.copy_from_slice(&child_meta.key);
        let child_attr = attrs::encode(&child_key, &Attributes { name: child_name.to_string() }).unwrap();
        let mut child_wrapped = compkey.to_vec();
        cipher::ecb_encrypt(&share_key, &mut child_wrapped);
        state.nodes.push(json!({
            "h": "sd1",
            "p": "sr1",
            "u": "usr9",
            "t": 0,
            "a": b64::encode(&child_attr),
            "k": format!("sr1:{}", b64::encode(&child_wrapped)),
            "s": 1234,
            "ts": FIXED_TS,
        }));

        ("sr1".to_string(), "sd1".to_string())
    }

    /// Handles one JSON command against the current state.
    fn dispatch(&self, cmd: &Value) -> Value {
        let mut state = self.state.lock();
        match cmd["a"].as_str().unwrap_or("") {
            "us" => {
                if cmd["user"].as_str() != Some(EMAIL)
                    || cmd["uh"].as_str() != Some(state.expected_uh.as_str())
                {
                    return json!(-9);
                }
                json!([{
                    "k": state.k_wire.clone(),
                    "privk": state.privk_wire.clone(),
                    "csid": state.csid_wire.clone(),
                }])
            }
            "ug" => json!([{ "u": OWNER, "email": EMAIL, "name": "Test User" }]),
            "f" => json!([{ "f": state.nodes.clone(), "ok": state.ok.clone() }]),
            "g" => {
                let handle = cmd["n"].as_str().unwrap_or("");
                match state.files.get(handle) {
                    Some(content) => json!([{
                        "g": format!("mock://dl/{handle}"),
                        "s": content.len() as u64,
                    }]),
                    None => json!(-9),
                }
            }
            "u" => {
                let size = cmd["s"].as_u64().unwrap_or(0);
                let id = state.next_id;
                state.next_id += 1;
                state.slots.insert(
                    id,
                    Slot {
                        size,
                        buf: vec![0u8; size as usize],
                        received: 0,
                        handle: format!("comp{id}"),
                    },
                );
                json!([{ "p": format!("mock://ul/{id}") }])
            }
            "p" => {
                let parent = cmd["t"].as_str().unwrap_or("").to_string();
                let put = &cmd["n"][0];
                let kind = put["t"].as_i64().unwrap_or(-1);
                let handle = format!("fh{}", state.next_id);
                state.next_id += 1;

                let mut record = json!({
                    "h": handle,
                    "p": parent,
                    "u": OWNER,
                    "t": kind,
                    "a": put["a"],
                    "k": format!("{OWNER}:{}", put["k"].as_str().unwrap_or("")),
                    "ts": FIXED_TS,
                });
                if kind == 0 {
                    // Resolve the completion handle to its upload slot
                    let completion = put["h"].as_str().unwrap_or("");
                    let id = match state
                        .slots
                        .iter()
                        .find(|(_, slot)| slot.handle == completion && slot.received >= slot.size)
                    {
                        Some((id, _)) => *id,
                        None => return json!(-9),
                    };
                    let slot = state.slots.remove(&id).unwrap();
                    record["s"] = json!(slot.size);
                    state.files.insert(handle.clone(), slot.buf);
                }
                state.nodes.push(record.clone());
                json!([{ "f": [record] }])
            }
            "a" => {
                let handle = cmd["n"].as_str().unwrap_or("");
                let attr = cmd["attr"].clone();
                let key = format!("{OWNER}:{}", cmd["key"].as_str().unwrap_or(""));
                match state.nodes.iter_mut().find(|n| n["h"].as_str() == Some(handle)) {
                    Some(record) => {
                        record["a"] = attr;
                        record["k"] = json!(key);
                        json!([0])
                    }
                    None => json!(-9),
                }
            }
            "m" => {
                let handle = cmd["n"].as_str().unwrap_or("");
                let parent = cmd["t"].clone();
                match state.nodes.iter_mut().find(|n| n["h"].as_str() == Some(handle)) {
                    Some(record) => {
                        record["p"] = parent;
                        json!([0])
                    }
                    None => json!(-9),
                }
            }
            "d" => {
                let handle = cmd["n"].as_str().unwrap_or("").to_string();
                state.nodes.retain(|n| n["h"].as_str() != Some(handle.as_str()));
                state.files.remove(&handle);
                json!([0])
            }
            _ => json!(-2),
        }
    }
}

#[async_trait]
impl Transport for MockServer {
    async fn post_json(&self, url: &str, body: &str) -> Result<String> {
        {
            let mut state = self.state.lock();
            state.requests.push(url.to_string());
            if state.fail_json > 0 {
                state.fail_json -= 1;
                return Err(connection_reset());
            }
            if state.eagain_budget > 0 {
                state.eagain_budget -= 1;
                return Ok("-3".to_string());
            }
        }

        let cmds: Value =
            serde_json::from_str(body).map_err(|e| Error::BadResp(e.to_string()))?;
        Ok(self.dispatch(&cmds[0]).to_string())
    }

    async fn get_chunk(&self, url: &str) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        if state.fail_chunks > 0 {
            state.fail_chunks -= 1;
            return Err(connection_reset());
        }

        let rest = url
            .strip_prefix("mock://dl/")
            .ok_or_else(|| Error::BadResp(format!("bad chunk url {url}")))?;
        let (handle, range) = rest
            .split_once('/')
            .ok_or_else(|| Error::BadResp(format!("bad chunk url {url}")))?;
        let (start, end) = range
            .split_once('-')
            .ok_or_else(|| Error::BadResp(format!("bad chunk range {range}")))?;
        let start: usize = start.parse().unwrap();
        let end: usize = end.parse().unwrap();

        let content = state
            .files
            .get(handle)
            .ok_or_else(|| Error::NotFound(handle.to_string()))?;
        let mut data = content[start..=end].to_vec();
        if let Some((corrupt_handle, index)) = &state.corrupt {
            if corrupt_handle == handle && (start..=end).contains(index) {
                data[index - start] ^= 0xFF;
            }
        }
        Ok(data)
    }

    async fn post_chunk(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        let rest = url
            .strip_prefix("mock://ul/")
            .ok_or_else(|| Error::BadResp(format!("bad upload url {url}")))?;
        let (id, start) = rest
            .split_once('/')
            .ok_or_else(|| Error::BadResp(format!("bad upload url {url}")))?;
        let id: u64 = id.parse().unwrap();
        let start: usize = start.parse().unwrap();

        let slot = state
            .slots
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("upload slot {id}")))?;
        slot.buf[start..start + body.len()].copy_from_slice(&body);
        slot.received += body.len() as u64;
        if slot.received >= slot.size {
            Ok(slot.handle.clone().into_bytes())
        } else {
            Ok(Vec::new())
        }
    }
}

/// Transport failure used to exercise the retry paths.
fn connection_reset() -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionReset,
        "mock transport failure",
    ))
}

/// Encodes one MPI: two-byte big-endian bit length, then the magnitude.
fn mpi(n: &BigUint) -> Vec<u8> {
    let mut out = (n.bits() as u16).to_be_bytes().to_vec();
    out.extend(n.to_bytes_be());
    out
}

/// Configuration pointing at the mock endpoint.
pub fn test_config() -> Config {
    Config {
        base_url: "mock://api".to_string(),
        retries: 2,
        ..Config::default()
    }
}

/// Builds a client over `server` without logging in.
pub fn client(server: &Arc<MockServer>) -> Mega {
    Mega::with_transport(test_config(), Arc::clone(server) as Arc<dyn Transport>).unwrap()
}

/// Builds a client and runs login + refresh against the fixture account.
pub async fn logged_in_client(server: &Arc<MockServer>) -> Mega {
    let mut mega = client(server);
    mega.login(EMAIL, PASSWORD).await.unwrap();
    mega.refresh().await.unwrap();
    mega
}
