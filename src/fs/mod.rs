//! The encrypted filesystem mirror.
//!
//! Rebuilds the user's node graph from the server manifest. Every node's key
//! arrives wrapped, and which key unwraps it depends on how the node is
//! reached: nodes the user owns unwrap directly under the master key, the
//! root of an incoming share unwraps under that share's key, and descendants
//! of a shared root resolve their share key through the wrapped-share-key
//! map. Manifest order is arbitrary - a child may arrive before its parent,
//! in which case a folder stub is forward-declared and upgraded in place
//! when the real entry shows up.
//!
//! Attribute decryption failure is never fatal here: a node that cannot name
//! itself is kept under a placeholder so the tree stays complete.

use crate::api::commands::{FilesResponse, ItemRecord};
use crate::crypto::{attrs, b64, cipher};
use crate::libs::error::{Error, Result};
use chrono::DateTime;
use std::collections::HashMap;
use tracing::{debug, warn};

pub mod node;

pub use node::{Node, NodeKind, NodeMeta};

/// Handle-indexed store of the reconstructed tree.
#[derive(Debug, Default)]
pub struct FileSystem {
    /// Every known node, stubs included.
    lookup: HashMap<String, Node>,
    /// Wrapped share keys by shared-folder handle, stored verbatim.
    shared_keys: HashMap<String, String>,
    /// Handles of the tops of incoming shares.
    shared_roots: Vec<String>,
    root: Option<String>,
    inbox: Option<String>,
    trash: Option<String>,
}

impl FileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops all reconstructed state before a full re-ingest.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Ingests a manifest response: share keys first, then every node
    /// record in server order.
    pub fn ingest(&mut self, manifest: &FilesResponse, master_key: &[u8; 16]) -> Result<()> {
        for ok in &manifest.ok {
            self.shared_keys.insert(ok.h.clone(), ok.k.clone());
        }
        for item in &manifest.f {
            self.add_node(item, master_key)?;
        }
        debug!(nodes = self.lookup.len(), shares = self.shared_roots.len(), "manifest ingested");
        Ok(())
    }

    /// Inserts or upgrades one manifest record.
    ///
    /// Unwraps the node key (three strategies, tried in order: self-owned,
    /// shared root, shared descendant), decrypts the attribute blob, links
    /// the node under its parent, and registers distinguished roots. A file
    /// or folder whose key cannot be resolved is skipped with a warning.
    pub fn add_node(&mut self, item: &ItemRecord, master_key: &[u8; 16]) -> Result<()> {
        let kind = NodeKind::from_discriminant(item.t)
            .ok_or_else(|| Error::BadResp(format!("unknown node kind {}", item.t)))?;

        let mut meta = None;
        let mut name = kind.default_name().to_string();
        let mut shared_root = false;

        if matches!(kind, NodeKind::File | NodeKind::Folder) {
            let blob = match self.resolve_key(item, master_key, &mut shared_root)? {
                Some(blob) => blob,
                None => {
                    warn!(handle = %item.h, "no resolvable key for node, skipping");
                    return Ok(());
                }
            };

            let node_meta = match (kind, blob.len()) {
                (NodeKind::File, 32) => NodeMeta::from_composite(&blob),
                (NodeKind::Folder, 16) => NodeMeta::from_folder_key(&blob),
                _ => {
                    warn!(handle = %item.h, len = blob.len(), "unexpected key length, skipping");
                    return Ok(());
                }
            };

            // A wrong key shows up as a garbled attribute blob; keep the
            // node under the placeholder name.
            let mut key = [0u8; 16];
            key.copy_from_slice(&node_meta.key);
            match b64::decode(&item.a).and_then(|blob| attrs::decode(&key, &blob)) {
                Ok(decoded) => name = decoded.name,
                Err(err) => {
                    warn!(handle = %item.h, error = %err, "attribute decode failed");
                }
            }
            meta = Some(node_meta);
        }

        let timestamp = DateTime::from_timestamp(item.ts, 0);
        let node = self
            .lookup
            .entry(item.h.clone())
            .or_insert_with(|| Node::stub(item.h.clone()));
        node.kind = kind;
        node.name = name;
        node.size = item.s;
        node.timestamp = timestamp;
        node.owner = item.u.clone();
        node.meta = meta;
        node.stub = false;

        if item.p.is_empty() {
            self.unlink(&item.h);
        } else {
            self.link(&item.h, &item.p);
        }

        match kind {
            NodeKind::Root => self.root = Some(item.h.clone()),
            NodeKind::Inbox => self.inbox = Some(item.h.clone()),
            NodeKind::Trash => self.trash = Some(item.h.clone()),
            _ => {}
        }
        if shared_root && !self.shared_roots.contains(&item.h) {
            self.shared_roots.push(item.h.clone());
        }
        Ok(())
    }

    /// Unwraps a node's key blob, trying the three strategies in order.
    fn resolve_key(
        &mut self,
        item: &ItemRecord,
        master_key: &[u8; 16],
        shared_root: &mut bool,
    ) -> Result<Option<Vec<u8>>> {
        if item.k.is_empty() {
            return Ok(None);
        }

        // Self-owned: the holder of the wrapped key is the item's owner.
        for (holder, wrapped) in key_entries(&item.k) {
            if !item.u.is_empty() && holder == item.u {
                let mut blob = b64::decode(wrapped)?;
                cipher::ecb_decrypt(master_key, &mut blob);
                return Ok(Some(blob));
            }
        }

        // Shared root: the record carries the share key itself, wrapped
        // under the master key. Cache the wrapped form for descendants.
        if let (Some(_su), Some(sk)) = (&item.su, &item.sk) {
            let share_key = unwrap_share_key(sk, master_key)?;
            self.shared_keys.insert(item.h.clone(), sk.clone());
            *shared_root = true;
            if let Some((_, wrapped)) = key_entries(&item.k).next() {
                let mut blob = b64::decode(wrapped)?;
                cipher::ecb_decrypt(&share_key, &mut blob);
                return Ok(Some(blob));
            }
            return Ok(None);
        }

        // Shared descendant: the holder is a shared folder whose wrapped
        // share key we have seen.
        for (holder, wrapped) in key_entries(&item.k) {
            if let Some(wrapped_share) = self.shared_keys.get(holder) {
                let share_key = unwrap_share_key(wrapped_share, master_key)?;
                let mut blob = b64::decode(wrapped)?;
                cipher::ecb_decrypt(&share_key, &mut blob);
                return Ok(Some(blob));
            }
        }

        Ok(None)
    }

    /// Links `child` under `parent`, forward-declaring the parent if its
    /// manifest entry has not been seen, and unlinking any previous parent.
    pub(crate) fn link(&mut self, child: &str, parent: &str) {
        if let Some(node) = self.lookup.get(child) {
            if node.parent.as_deref() == Some(parent) {
                return;
            }
        }
        self.unlink(child);
        self.lookup
            .entry(parent.to_string())
            .or_insert_with(|| Node::stub(parent.to_string()))
            .children
            .insert(child.to_string());
        if let Some(node) = self.lookup.get_mut(child) {
            node.parent = Some(parent.to_string());
        }
    }

    /// Detaches `child` from its current parent, if any.
    pub(crate) fn unlink(&mut self, child: &str) {
        let old_parent = match self.lookup.get_mut(child) {
            Some(node) => node.parent.take(),
            None => None,
        };
        if let Some(parent) = old_parent {
            if let Some(parent_node) = self.lookup.get_mut(&parent) {
                parent_node.children.remove(child);
            }
        }
    }

    /// Removes a node from the index entirely, detaching it from its parent
    /// first. Children, if any, keep their back-references and become
    /// unreachable until a manifest refresh reconciles them.
    pub(crate) fn remove(&mut self, handle: &str) -> Result<()> {
        if !self.lookup.contains_key(handle) {
            return Err(Error::NotFound(handle.to_string()));
        }
        self.unlink(handle);
        self.lookup.remove(handle);
        self.shared_roots.retain(|h| h != handle);
        Ok(())
    }

    /// Looks up a node by handle.
    pub fn node(&self, handle: &str) -> Option<&Node> {
        self.lookup.get(handle)
    }

    pub(crate) fn node_mut(&mut self, handle: &str) -> Option<&mut Node> {
        self.lookup.get_mut(handle)
    }

    /// Iterates every known node, stubs included.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.lookup.values()
    }

    /// Handle of the cloud drive root, once ingested.
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// Handle of the inbox root, once ingested.
    pub fn inbox(&self) -> Option<&str> {
        self.inbox.as_deref()
    }

    /// Handle of the trash root, once ingested.
    pub fn trash(&self) -> Option<&str> {
        self.trash.as_deref()
    }

    /// Handles of the tops of incoming shares.
    pub fn shared_roots(&self) -> &[String] {
        &self.shared_roots
    }

    /// The wrapped share key cached for a shared folder, if any.
    pub fn shared_key(&self, handle: &str) -> Option<&str> {
        self.shared_keys.get(handle).map(String::as_str)
    }

    /// Walks `names` down from `from` by child display name.
    ///
    /// Returns the handle chain of the resolved components; the first name
    /// that does not match any child fails the walk with `NotFound`.
    pub fn path_lookup(&self, from: &str, names: &[&str]) -> Result<Vec<String>> {
        let mut current = self
            .lookup
            .get(from)
            .ok_or_else(|| Error::NotFound(from.to_string()))?;
        let mut chain = Vec::with_capacity(names.len());
        for name in names {
            let next = current
                .children
                .iter()
                .filter_map(|h| self.lookup.get(h))
                .find(|child| child.name == *name)
                .ok_or_else(|| Error::NotFound((*name).to_string()))?;
            chain.push(next.handle.clone());
            current = next;
        }
        Ok(chain)
    }
}

/// Iterates the `holder:wrapped` entries of a manifest key string.
fn key_entries(key: &str) -> impl Iterator<Item = (&str, &str)> {
    key.split('/').filter_map(|entry| entry.split_once(':'))
}

/// Decodes and unwraps one share key under the master key.
fn unwrap_share_key(wrapped: &str, master_key: &[u8; 16]) -> Result<[u8; 16]> {
    let mut blob = b64::decode(wrapped)?;
    if blob.len() != 16 {
        return Err(Error::BadResp("share key is not 16 bytes".into()));
    }
    cipher::ecb_decrypt(master_key, &mut blob);
    let mut key = [0u8; 16];
    key.copy_from_slice(&blob);
    Ok(key)
}
