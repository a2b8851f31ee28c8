//! Nodes of the encrypted filesystem mirror.

use crate::crypto::words::{to_bytes, to_words};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Display name of a node whose attribute blob failed to decrypt.
pub const UNKNOWN_NAME: &str = "UNKNOWN";

/// What a node is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Regular file.
    File,
    /// Regular folder.
    Folder,
    /// The cloud drive root.
    Root,
    /// The inbox root.
    Inbox,
    /// The trash root.
    Trash,
}

impl NodeKind {
    /// Maps the protocol's kind discriminant.
    pub fn from_discriminant(t: i64) -> Option<Self> {
        match t {
            0 => Some(NodeKind::File),
            1 => Some(NodeKind::Folder),
            2 => Some(NodeKind::Root),
            3 => Some(NodeKind::Inbox),
            4 => Some(NodeKind::Trash),
            _ => None,
        }
    }

    /// Default display name; the distinguished roots carry no attributes.
    pub fn default_name(self) -> &'static str {
        match self {
            NodeKind::Root => "Cloud Drive",
            NodeKind::Inbox => "Inbox",
            NodeKind::Trash => "Rubbish Bin",
            NodeKind::File | NodeKind::Folder => UNKNOWN_NAME,
        }
    }
}

/// Key material of a node.
///
/// For files all four fields are populated: `key` is the effective AES-CTR
/// content key, `iv` carries the 64-bit nonce prefix in its first half,
/// `mac` is the expected folded content authenticator, and `compkey` is the
/// unfolded 256-bit composite re-wrapped on rename. Folders keep only their
/// 128-bit key, duplicated into `compkey`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeMeta {
    /// Effective AES key (16 bytes).
    pub key: Vec<u8>,
    /// CTR nonce prefix in the first 8 bytes, zero tail (16 bytes).
    pub iv: Vec<u8>,
    /// Expected folded MAC (8 bytes); empty for folders.
    pub mac: Vec<u8>,
    /// Unfolded key material (32 bytes for files, 16 for folders).
    pub compkey: Vec<u8>,
}

impl NodeMeta {
    /// Derives file key material from the unwrapped 256-bit composite.
    ///
    /// The effective key is the XOR of the composite halves; words 4-5 are
    /// the nonce prefix and words 6-7 the expected MAC.
    pub fn from_composite(compkey: &[u8]) -> Self {
        let w = to_words(compkey);
        Self {
            key: to_bytes(&[w[0] ^ w[4], w[1] ^ w[5], w[2] ^ w[6], w[3] ^ w[7]]),
            iv: to_bytes(&[w[4], w[5], 0, 0]),
            mac: to_bytes(&[w[6], w[7]]),
            compkey: compkey.to_vec(),
        }
    }

    /// Wraps a bare 128-bit folder key.
    pub fn from_folder_key(key: &[u8]) -> Self {
        Self {
            key: key.to_vec(),
            iv: Vec::new(),
            mac: Vec::new(),
            compkey: key.to_vec(),
        }
    }
}

/// A vertex of the filesystem tree.
///
/// Parent and children are held by handle; the index owns every node, so no
/// reference cycles exist.
#[derive(Clone, Debug)]
pub struct Node {
    /// Server-assigned identifier, the primary key everywhere.
    pub handle: String,
    /// What the node is.
    pub kind: NodeKind,
    /// Decrypted display name, or [`UNKNOWN_NAME`].
    pub name: String,
    /// Content size in bytes; zero for folders.
    pub size: u64,
    /// Modification time, when the server reported one.
    pub timestamp: Option<DateTime<Utc>>,
    /// Owner user id.
    pub owner: String,
    /// Parent handle; `None` for the distinguished roots.
    pub parent: Option<String>,
    /// Handles of the children.
    pub children: HashSet<String>,
    /// Key material; `None` until the node's manifest entry is seen.
    pub meta: Option<NodeMeta>,
    /// True while the node is only a forward declaration for a child.
    pub(crate) stub: bool,
}

impl Node {
    /// Forward-declares a folder whose manifest entry has not arrived yet.
    pub(crate) fn stub(handle: String) -> Self {
        Self {
            handle,
            kind: NodeKind::Folder,
            name: UNKNOWN_NAME.to_string(),
            size: 0,
            timestamp: None,
            owner: String::new(),
            parent: None,
            children: HashSet::new(),
            meta: None,
            stub: true,
        }
    }

    /// True for file nodes.
    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    /// True for anything that can hold children.
    pub fn is_container(&self) -> bool {
        !self.is_file()
    }
}
