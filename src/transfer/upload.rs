//! Upload engine.
//!
//! Mirrors the download path with the transforms reversed: each chunk is
//! read from the source at its scheduled offset, MAC'd in the clear,
//! CTR-encrypted and posted to the temporary upload URL. The server answers
//! chunk posts with an empty body except for the completion handle, which
//! may arrive on any chunk; the last non-empty body wins. Once the pool
//! drains, the folded MAC and the fresh key material are combined into the
//! 256-bit composite, wrapped under the master key, and the upload is
//! finalized with a `p` command that yields the new node record.

use crate::api::commands::{PutNode, PutResponse, Request, UploadResponse, KIND_FILE};
use crate::api::{Api, Transport};
use crate::crypto::attrs::{self, Attributes};
use crate::crypto::b64;
use crate::crypto::cipher::{ctr_transform, ecb_encrypt};
use crate::crypto::mac::{chunk_mac, MacFold};
use crate::crypto::words::{to_bytes, to_words};
use crate::libs::config::Config;
use crate::libs::error::{Error, Result};
use crate::transfer::{coordinate, schedule, RETRY_PAUSE};
use parking_lot::Mutex;
use rand::RngCore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info};

/// Uploads the file at `src` under `parent`, returning the node record the
/// server created.
pub async fn upload_node(
    api: &Api,
    config: &Config,
    master_key: &[u8; 16],
    src: &Path,
    parent: &str,
    name: &str,
) -> Result<crate::api::commands::ItemRecord> {
    let size = tokio::fs::metadata(src).await?.len();
    let slot: UploadResponse = api.request_as(&Request::Upload { s: size }).await?;
    let ranges = Arc::new(schedule::chunk_ranges(size));
    debug!(src = %src.display(), size, chunks = ranges.len(), "upload start");

    // Fresh key material: words 0-3 are the content key, 4-5 the nonce prefix
    let mut ukey = [0u8; 24];
    rand::rngs::OsRng.fill_bytes(&mut ukey);
    let mut key = [0u8; 16];
    key.copy_from_slice(&ukey[..16]);
    let mut iv = [0u8; 16];
    iv[..8].copy_from_slice(&ukey[16..24]);

    let macs = Arc::new(Mutex::new(vec![[0u8; 16]; ranges.len()]));
    let completion: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

    if ranges.is_empty() {
        // Nothing to stream; a single empty post still yields the handle
        let body = api
            .transport()
            .post_chunk(&format!("{}/0", slot.url), Vec::new())
            .await?;
        if !body.is_empty() {
            *completion.lock() = Some(decode_handle(body)?);
        }
    } else {
        let workers = config.ul_workers.min(ranges.len());
        let (jobs_tx, jobs_rx) = flume::bounded(workers);
        let (done_tx, done_rx) = flume::bounded(workers);
        for _ in 0..workers {
            let worker = ChunkPoster {
                transport: api.transport(),
                url: slot.url.clone(),
                src: src.to_path_buf(),
                ranges: Arc::clone(&ranges),
                macs: Arc::clone(&macs),
                completion: Arc::clone(&completion),
                key,
                iv,
                retries: config.retries,
            };
            tokio::spawn(worker.run(jobs_rx.clone(), done_tx.clone()));
        }
        drop(done_tx);
        coordinate(jobs_tx, done_rx, ranges.len(), workers).await?;
    }

    let mut fold = MacFold::new(&key);
    for mac in macs.lock().iter() {
        fold.absorb(mac);
    }
    let meta_mac = fold.finish();

    // Composite: key XOR (nonce prefix, MAC), then the material itself
    let u = to_words(&ukey);
    let m = to_words(&meta_mac);
    let mut compkey = to_bytes(&[
        u[0] ^ u[4],
        u[1] ^ u[5],
        u[2] ^ m[0],
        u[3] ^ m[1],
        u[4],
        u[5],
        m[0],
        m[1],
    ]);
    ecb_encrypt(master_key, &mut compkey);

    let attr_blob = attrs::encode(&key, &Attributes { name: name.to_string() })?;
    let handle = completion
        .lock()
        .take()
        .ok_or_else(|| Error::BadResp("upload yielded no completion handle".into()))?;

    let request = Request::Put {
        t: parent.to_string(),
        n: vec![PutNode {
            h: handle,
            t: KIND_FILE,
            a: b64::encode(&attr_blob),
            k: b64::encode(&compkey),
        }],
    };
    let put: PutResponse = api.request_as(&request).await?;
    let record = put
        .f
        .into_iter()
        .next()
        .ok_or_else(|| Error::BadResp("finalize returned no node".into()))?;

    info!(src = %src.display(), handle = %record.h, "upload complete");
    Ok(record)
}

/// One upload worker: pulls chunk indices until the job channel closes.
struct ChunkPoster {
    transport: Arc<dyn Transport>,
    url: String,
    src: PathBuf,
    ranges: Arc<Vec<(u64, u64)>>,
    macs: Arc<Mutex<Vec<[u8; 16]>>>,
    completion: Arc<Mutex<Option<String>>>,
    key: [u8; 16],
    iv: [u8; 16],
    retries: u32,
}

impl ChunkPoster {
    async fn run(self, jobs: flume::Receiver<usize>, done: flume::Sender<Result<()>>) {
        while let Ok(index) = jobs.recv_async().await {
            let result = self.process(index).await;
            if done.send_async(result).await.is_err() {
                break;
            }
        }
    }

    async fn process(&self, index: usize) -> Result<()> {
        let (start, len) = self.ranges[index];

        let mut file = tokio::fs::File::open(&self.src).await?;
        file.seek(std::io::SeekFrom::Start(start)).await?;
        let mut data = vec![0u8; len as usize];
        file.read_exact(&mut data).await?;

        // MAC the plaintext, then encrypt it in place
        let mac = chunk_mac(&self.key, &self.iv, &data);
        ctr_transform(&self.key, &self.iv, start, &mut data);

        let url = format!("{}/{}", self.url, start);
        let mut attempt = 0;
        let body = loop {
            match self.transport.post_chunk(&url, data.clone()).await {
                Ok(body) => break body,
                Err(err) if err.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    tokio::time::sleep(RETRY_PAUSE).await;
                }
                Err(err) => return Err(err),
            }
        };

        if !body.is_empty() {
            *self.completion.lock() = Some(decode_handle(body)?);
        }
        self.macs.lock()[index] = mac;
        Ok(())
    }
}

/// Completion handles are short ASCII tokens.
fn decode_handle(body: Vec<u8>) -> Result<String> {
    String::from_utf8(body).map_err(|_| Error::BadResp("completion handle is not UTF-8".into()))
}
