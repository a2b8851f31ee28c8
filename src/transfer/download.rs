//! Download engine.
//!
//! Streams a file node into a destination path: every chunk is fetched from
//! the temporary download URL, CTR-decrypted, written at its exact offset,
//! and leaves its MAC block behind. After the pool drains, the blocks are
//! folded in schedule order and checked against the node's expected
//! authenticator. Any failure - a worker error or a MAC mismatch - unlinks
//! the partially written destination.

use crate::api::commands::{DownloadResponse, Request};
use crate::api::{Api, Transport};
use crate::crypto::cipher::ctr_transform;
use crate::crypto::mac::{chunk_mac, MacFold};
use crate::fs::node::Node;
use crate::libs::config::Config;
use crate::libs::error::{Error, Result};
use crate::transfer::{coordinate, schedule, RETRY_PAUSE};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info};

/// Downloads `node` to `dest`, verifying the content authenticator.
pub async fn download_node(api: &Api, config: &Config, node: &Node, dest: &Path) -> Result<()> {
    let meta = node
        .meta
        .as_ref()
        .filter(|meta| meta.compkey.len() == 32)
        .ok_or(Error::BadArgs("file node with key material"))?;
    let mut key = [0u8; 16];
    key.copy_from_slice(&meta.key);
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&meta.iv);

    let request = Request::Download {
        g: 1,
        n: node.handle.clone(),
    };
    let slot: DownloadResponse = api.request_as(&request).await?;
    let ranges = Arc::new(schedule::chunk_ranges(slot.size));
    debug!(handle = %node.handle, size = slot.size, chunks = ranges.len(), "download start");

    let file = tokio::fs::File::create(dest).await?;
    file.set_len(slot.size).await?;
    drop(file);

    let macs = Arc::new(Mutex::new(vec![[0u8; 16]; ranges.len()]));
    let result = if ranges.is_empty() {
        Ok(())
    } else {
        let workers = config.dl_workers.min(ranges.len());
        let (jobs_tx, jobs_rx) = flume::bounded(workers);
        let (done_tx, done_rx) = flume::bounded(workers);
        for _ in 0..workers {
            let worker = ChunkFetcher {
                transport: api.transport(),
                url: slot.url.clone(),
                dest: dest.to_path_buf(),
                ranges: Arc::clone(&ranges),
                macs: Arc::clone(&macs),
                key,
                iv,
                retries: config.retries,
            };
            tokio::spawn(worker.run(jobs_rx.clone(), done_tx.clone()));
        }
        drop(done_tx);
        coordinate(jobs_tx, done_rx, ranges.len(), workers).await
    };

    if let Err(err) = result {
        let _ = tokio::fs::remove_file(dest).await;
        return Err(err);
    }

    let mut fold = MacFold::new(&key);
    for mac in macs.lock().iter() {
        fold.absorb(mac);
    }
    if fold.finish()[..] != meta.mac[..] {
        let _ = tokio::fs::remove_file(dest).await;
        return Err(Error::MacMismatch);
    }

    info!(handle = %node.handle, dest = %dest.display(), "download complete");
    Ok(())
}

/// One download worker: pulls chunk indices until the job channel closes.
struct ChunkFetcher {
    transport: Arc<dyn Transport>,
    url: String,
    dest: PathBuf,
    ranges: Arc<Vec<(u64, u64)>>,
    macs: Arc<Mutex<Vec<[u8; 16]>>>,
    key: [u8; 16],
    iv: [u8; 16],
    retries: u32,
}

impl ChunkFetcher {
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
        let url = format!("{}/{}-{}", self.url, start, start + len - 1);

        let mut attempt = 0;
        let mut data = loop {
            match self.transport.get_chunk(&url).await {
                Ok(data) => break data,
                Err(err) if err.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    tokio::time::sleep(RETRY_PAUSE).await;
                }
                Err(err) => return Err(err),
            }
        };
        if data.len() as u64 != len {
            return Err(Error::BadResp(format!(
                "chunk at {start} is {} bytes, expected {len}",
                data.len()
            )));
        }

        ctr_transform(&self.key, &self.iv, start, &mut data);
        let mac = chunk_mac(&self.key, &self.iv, &data);

        // Offsets are disjoint, so each worker writes through its own handle
        let mut file = tokio::fs::OpenOptions::new().write(true).open(&self.dest).await?;
        file.seek(std::io::SeekFrom::Start(start)).await?;
        file.write_all(&data).await?;

        self.macs.lock()[index] = mac;
        Ok(())
    }
}
