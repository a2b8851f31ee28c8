//! Wire types for the JSON command protocol.
//!
//! Every API exchange is a one-element JSON array: a single command object
//! tagged by its `a` field on the way out, a single response object (or a
//! bare numeric error code) on the way back. The records here mirror the
//! server's field names, which are one or two letters; everything longer
//! lives only on the Rust side of the serde rename.

use serde::{Deserialize, Serialize};

/// Node kind discriminant for file entries in `p` commands.
pub const KIND_FILE: i64 = 0;

/// Node kind discriminant for folder entries in `p` commands.
pub const KIND_FOLDER: i64 = 1;

/// Placeholder handle used when creating a folder, which has no upload
/// completion handle to finalize.
pub const FOLDER_PLACEHOLDER_HANDLE: &str = "xxxxxxxx";

/// A command object, tagged by the protocol's `a` field.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "a")]
pub enum Request {
    /// Establish a session from the login handle.
    #[serde(rename = "us")]
    Login { user: String, uh: String },

    /// Fetch account information for the session user.
    #[serde(rename = "ug")]
    UserInfo,

    /// Fetch the full filesystem manifest.
    #[serde(rename = "f")]
    Files { c: u8 },

    /// Obtain a temporary download URL for a file node.
    #[serde(rename = "g")]
    Download { g: u8, n: String },

    /// Reserve an upload slot for a file of `s` bytes.
    #[serde(rename = "u")]
    Upload { s: u64 },

    /// Finalize an upload or create a folder under parent `t`.
    #[serde(rename = "p")]
    Put { t: String, n: Vec<PutNode> },

    /// Re-encode a node's attributes and wrapped key.
    #[serde(rename = "a")]
    SetAttr {
        n: String,
        attr: String,
        key: String,
        i: String,
    },

    /// Move node `n` under parent `t`.
    #[serde(rename = "m")]
    Move { n: String, t: String, i: String },

    /// Destroy node `n`.
    #[serde(rename = "d")]
    Delete { n: String, i: String },
}

/// One node entry of a `p` command.
#[derive(Debug, Clone, Serialize)]
pub struct PutNode {
    /// Upload completion handle, or the folder placeholder.
    pub h: String,
    /// Kind discriminant ([`KIND_FILE`] or [`KIND_FOLDER`]).
    pub t: i64,
    /// Encrypted attribute blob, base64url.
    pub a: String,
    /// Wrapped node key, base64url.
    pub k: String,
}

/// Response to `us`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    /// Master key wrapped under the password key, base64url.
    pub k: String,
    /// RSA private key blob encrypted under the master key, base64url.
    pub privk: String,
    /// RSA-encrypted session challenge, base64url.
    pub csid: String,
}

/// Response to `ug`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserResponse {
    /// Opaque user id.
    #[serde(default)]
    pub u: String,
    /// Account email, when the server discloses it.
    #[serde(default)]
    pub email: Option<String>,
    /// Display name, when set.
    #[serde(default)]
    pub name: Option<String>,
}

/// Response to `f`.
#[derive(Debug, Clone, Deserialize)]
pub struct FilesResponse {
    /// Node records, in server order; children may precede parents.
    #[serde(default)]
    pub f: Vec<ItemRecord>,
    /// Wrapped share keys for incoming shares.
    #[serde(default)]
    pub ok: Vec<OkRecord>,
}

/// One wrapped share key from the manifest's `ok` section.
#[derive(Debug, Clone, Deserialize)]
pub struct OkRecord {
    /// Handle of the shared folder.
    pub h: String,
    /// Share key wrapped under the master key, base64url.
    pub k: String,
}

/// One node record from the manifest or a `p` response.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemRecord {
    /// Node handle.
    pub h: String,
    /// Parent handle; empty for roots.
    #[serde(default)]
    pub p: String,
    /// Owner user id.
    #[serde(default)]
    pub u: String,
    /// Kind discriminant (0 file, 1 folder, 2 root, 3 inbox, 4 trash).
    pub t: i64,
    /// Encrypted attribute blob, base64url.
    #[serde(default)]
    pub a: String,
    /// Wrapped key string, `holder:wrapped[/holder:wrapped...]`.
    #[serde(default)]
    pub k: String,
    /// File size in bytes.
    #[serde(default)]
    pub s: u64,
    /// Modification timestamp, seconds since the epoch.
    #[serde(default)]
    pub ts: i64,
    /// Sharing user id, present on the root of an incoming share.
    #[serde(default)]
    pub su: Option<String>,
    /// Share key wrapped under the master key, present on a shared root.
    #[serde(default)]
    pub sk: Option<String>,
}

/// Response to `g`.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadResponse {
    /// Temporary chunk download URL.
    #[serde(rename = "g")]
    pub url: String,
    /// Encrypted content size in bytes.
    #[serde(rename = "s")]
    pub size: u64,
}

/// Response to `u`.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    /// Temporary chunk upload URL.
    #[serde(rename = "p")]
    pub url: String,
}

/// Response to `p`.
#[derive(Debug, Clone, Deserialize)]
pub struct PutResponse {
    /// The node records the server created.
    #[serde(default)]
    pub f: Vec<ItemRecord>,
}
