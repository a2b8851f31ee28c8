//! The client facade.
//!
//! `Mega` owns the pieces the rest of the crate provides: the sequenced
//! request layer, the master session state recovered at login, and the
//! filesystem mirror rebuilt from the manifest. Every public operation is a
//! thin sequence over those parts - derive or re-wrap the key material the
//! server expects, issue the command, and reconcile the local mirror.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use megalite::{libs::config::Config, Mega};
//!
//! # async fn example() -> megalite::libs::error::Result<()> {
//! let mut mega = Mega::new(Config::default())?;
//! mega.login("user@example.com", "correct horse").await?;
//! mega.refresh().await?;
//!
//! let root = mega.root().unwrap().to_string();
//! let dir = mega.mkdir(&root, "reports").await?;
//! mega.upload_file("q3.pdf".as_ref(), &dir, None).await?;
//! # Ok(())
//! # }
//! ```

use crate::api::commands::{
    FilesResponse, LoginResponse, PutNode, PutResponse, Request, UserResponse, FOLDER_PLACEHOLDER_HANDLE,
    KIND_FOLDER,
};
use crate::api::{Api, HttpTransport, Transport};
use crate::crypto::attrs::{self, Attributes};
use crate::crypto::{b64, cipher, kdf, rsa};
use crate::fs::node::Node;
use crate::fs::FileSystem;
use crate::libs::config::Config;
use crate::libs::error::{Error, Result};
use crate::transfer::{download, upload};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Length of the decoded session id, in bytes.
const SESSION_ID_LEN: usize = 43;

/// Length of the per-client request nonce.
const REQUEST_NONCE_LEN: usize = 10;

/// An authenticated client holding a mirror of the encrypted filesystem.
#[derive(Debug)]
pub struct Mega {
    api: Api,
    config: Config,
    fs: FileSystem,
    master_key: Option<[u8; 16]>,
    user: Option<UserResponse>,
    request_nonce: String,
}

impl Mega {
    /// Creates a client over HTTPS with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(config.timeout)?);
        Self::with_transport(config, transport)
    }

    /// Creates a client over a caller-provided transport.
    ///
    /// This is the seam tests use to substitute an in-memory server.
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let api = Api::new(transport, config.base_url.clone(), config.retries);
        let request_nonce = rand::rngs::OsRng
            .sample_iter(&Alphanumeric)
            .take(REQUEST_NONCE_LEN)
            .map(char::from)
            .collect();
        Ok(Self {
            api,
            config,
            fs: FileSystem::new(),
            master_key: None,
            user: None,
            request_nonce,
        })
    }

    /// Establishes a session and fetches the account record.
    ///
    /// Derives the password key, hashes the lowercased email into the login
    /// handle, unwraps the master key from the response, and recovers the
    /// session id from the RSA challenge. Rejected credentials surface as
    /// `BadAuth`.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<()> {
        if email.is_empty() {
            return Err(Error::BadArgs("email"));
        }
        if password.is_empty() {
            return Err(Error::BadArgs("password"));
        }

        let passkey = kdf::password_key(password);
        let handle = kdf::stringhash(&email.to_lowercase(), &passkey);
        let request = Request::Login {
            user: email.to_string(),
            uh: handle,
        };
        let login: LoginResponse = self.api.request_as(&request).await.map_err(auth_err)?;

        // Master key, wrapped under the password key
        let mut master = b64::decode(&login.k)?;
        if master.len() != 16 {
            return Err(Error::BadResp("master key is not 16 bytes".into()));
        }
        cipher::ecb_decrypt(&passkey, &mut master);
        let mut master_key = [0u8; 16];
        master_key.copy_from_slice(&master);

        // RSA private key blob, wrapped under the master key
        let mut privk = b64::decode(&login.privk)?;
        if privk.is_empty() || privk.len() % 16 != 0 {
            return Err(Error::BadResp("private key blob not block aligned".into()));
        }
        cipher::ecb_decrypt(&master_key, &mut privk);

        let csid = b64::decode(&login.csid)?;
        let challenge = rsa::decrypt_session_challenge(&privk, &csid)?;
        if challenge.len() < SESSION_ID_LEN {
            return Err(Error::BadResp("session challenge too short".into()));
        }
        self.api.set_session(b64::encode(&challenge[..SESSION_ID_LEN]));
        self.master_key = Some(master_key);

        let user: UserResponse = self.api.request_as(&Request::UserInfo).await.map_err(auth_err)?;
        info!(user = %user.u, "session established");
        self.user = Some(user);
        Ok(())
    }

    /// The account record fetched at login.
    pub fn user(&self) -> Option<&UserResponse> {
        self.user.as_ref()
    }

    /// The session id, once a login succeeded.
    pub fn session(&self) -> Option<String> {
        self.api.session()
    }

    /// Fetches the manifest and rebuilds the filesystem mirror.
    pub async fn refresh(&mut self) -> Result<()> {
        let master_key = self.master()?;
        let manifest: FilesResponse = self.api.request_as(&Request::Files { c: 1 }).await?;
        self.fs.clear();
        self.fs.ingest(&manifest, &master_key)
    }

    /// The filesystem mirror.
    pub fn filesystem(&self) -> &FileSystem {
        &self.fs
    }

    /// Looks up a node by handle.
    pub fn node(&self, handle: &str) -> Option<&Node> {
        self.fs.node(handle)
    }

    /// Handle of the cloud drive root.
    pub fn root(&self) -> Option<&str> {
        self.fs.root()
    }

    /// Handle of the inbox root.
    pub fn inbox(&self) -> Option<&str> {
        self.fs.inbox()
    }

    /// Handle of the trash root.
    pub fn trash(&self) -> Option<&str> {
        self.fs.trash()
    }

    /// Handles of the tops of incoming shares.
    pub fn shared_roots(&self) -> &[String] {
        self.fs.shared_roots()
    }

    /// Walks display names down from `from`; see [`FileSystem::path_lookup`].
    pub fn path_lookup(&self, from: &str, names: &[&str]) -> Result<Vec<String>> {
        self.fs.path_lookup(from, names)
    }

    /// Downloads a file node to `dest`, verifying its authenticator.
    pub async fn download_file(&self, handle: &str, dest: &Path) -> Result<()> {
        self.master()?;
        let node = self
            .fs
            .node(handle)
            .ok_or_else(|| Error::NotFound(handle.to_string()))?;
        if !node.is_file() {
            return Err(Error::BadArgs("file node"));
        }
        download::download_node(&self.api, &self.config, node, dest).await
    }

    /// Uploads the file at `src` under `parent`.
    ///
    /// The display name defaults to the source file name. Returns the new
    /// node's handle.
    pub async fn upload_file(&mut self, src: &Path, parent: &str, name: Option<&str>) -> Result<String> {
        let master_key = self.master()?;
        self.container(parent)?;
        let name = match name {
            Some(name) if !name.is_empty() => name.to_string(),
            Some(_) => return Err(Error::BadArgs("name")),
            None => src
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or(Error::BadArgs("source file name"))?
                .to_string(),
        };

        let record = upload::upload_node(&self.api, &self.config, &master_key, src, parent, &name).await?;
        let handle = record.h.clone();
        self.fs.add_node(&record, &master_key)?;
        Ok(handle)
    }

    /// Creates a folder named `name` under `parent`, returning its handle.
    ///
    /// Follows the upload finalization path with a placeholder handle and a
    /// fresh key wrapped under the master key.
    pub async fn mkdir(&mut self, parent: &str, name: &str) -> Result<String> {
        let master_key = self.master()?;
        self.container(parent)?;
        if name.is_empty() {
            return Err(Error::BadArgs("name"));
        }

        let mut key = [0u8; 16];
        rand::rngs::OsRng.fill(&mut key);
        let attr_blob = attrs::encode(&key, &Attributes { name: name.to_string() })?;
        let mut wrapped = key.to_vec();
        cipher::ecb_encrypt(&master_key, &mut wrapped);

        let request = Request::Put {
            t: parent.to_string(),
            n: vec![PutNode {
                h: FOLDER_PLACEHOLDER_HANDLE.to_string(),
                t: KIND_FOLDER,
                a: b64::encode(&attr_blob),
                k: b64::encode(&wrapped),
            }],
        };
        let put: PutResponse = self.api.request_as(&request).await?;
        let record = put
            .f
            .into_iter()
            .next()
            .ok_or_else(|| Error::BadResp("folder create returned no node".into()))?;
        let handle = record.h.clone();
        self.fs.add_node(&record, &master_key)?;
        self.refresh().await?;
        Ok(handle)
    }

    /// Renames a node: re-encrypts its attributes under its own key and
    /// re-wraps its key material under the master key.
    pub async fn rename(&mut self, handle: &str, new_name: &str) -> Result<()> {
        let master_key = self.master()?;
        if new_name.is_empty() {
            return Err(Error::BadArgs("name"));
        }
        let node = self
            .fs
            .node(handle)
            .ok_or_else(|| Error::NotFound(handle.to_string()))?;
        let meta = node.meta.as_ref().ok_or(Error::BadArgs("node key material"))?;

        let mut key = [0u8; 16];
        key.copy_from_slice(&meta.key);
        let attr_blob = attrs::encode(&key, &Attributes { name: new_name.to_string() })?;
        let mut wrapped = meta.compkey.clone();
        cipher::ecb_encrypt(&master_key, &mut wrapped);

        let request = Request::SetAttr {
            n: handle.to_string(),
            attr: b64::encode(&attr_blob),
            key: b64::encode(&wrapped),
            i: self.request_nonce.clone(),
        };
        self.api.request(&request).await?;

        if let Some(node) = self.fs.node_mut(handle) {
            node.name = new_name.to_string();
        }
        self.refresh().await
    }

    /// Moves a node under a new parent.
    pub async fn move_node(&mut self, handle: &str, new_parent: &str) -> Result<()> {
        self.master()?;
        if self.fs.node(handle).is_none() {
            return Err(Error::NotFound(handle.to_string()));
        }
        self.container(new_parent)?;

        let request = Request::Move {
            n: handle.to_string(),
            t: new_parent.to_string(),
            i: self.request_nonce.clone(),
        };
        self.api.request(&request).await?;

        // Unlink from the old parent, then link under the new one
        self.fs.link(handle, new_parent);
        self.refresh().await
    }

    /// Deletes a node: a move into trash, or permanent destruction.
    pub async fn delete(&mut self, handle: &str, destroy: bool) -> Result<()> {
        self.master()?;
        if !destroy {
            let trash = self
                .fs
                .trash()
                .ok_or_else(|| Error::NotFound("trash".to_string()))?
                .to_string();
            return self.move_node(handle, &trash).await;
        }

        if self.fs.node(handle).is_none() {
            return Err(Error::NotFound(handle.to_string()));
        }
        let request = Request::Delete {
            n: handle.to_string(),
            i: self.request_nonce.clone(),
        };
        self.api.request(&request).await?;

        // Unlinks through the node's own parent back-reference
        self.fs.remove(handle)?;
        self.refresh().await
    }

    /// The master key, or `BadAuth` before a login.
    fn master(&self) -> Result<[u8; 16]> {
        self.master_key.ok_or(Error::BadAuth)
    }

    /// Validates that `handle` names a known container node.
    fn container(&self, handle: &str) -> Result<()> {
        if handle.is_empty() {
            return Err(Error::BadArgs("parent handle"));
        }
        let node = self
            .fs
            .node(handle)
            .ok_or_else(|| Error::NotFound(handle.to_string()))?;
        if !node.is_container() {
            return Err(Error::BadArgs("container node"));
        }
        Ok(())
    }
}

/// Maps application error codes during login to `BadAuth`.
fn auth_err(err: Error) -> Error {
    match err {
        Error::Api(_) => Error::BadAuth,
        other => other,
    }
}
