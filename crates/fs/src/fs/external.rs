use std::path::Path as StdPath;
use std::str::FromStr;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::crypto::{Key, PrivateName};
use crate::error::FsError;
use crate::linked_data::Cid;

/// The three values a host persists between sessions: the root CID,
/// the private root's symmetric key, and its current private name.
/// Emitted fresh on every commit; consumed on open.
#[derive(Debug, Clone, PartialEq)]
pub struct RootState {
    pub root_cid: Cid,
    pub root_key: Key,
    pub private_root_name: PrivateName,
}

#[derive(Serialize, Deserialize)]
struct RootStateRecord {
    #[serde(rename = "RootCID")]
    root_cid: String,
    #[serde(rename = "RootKey")]
    root_key: String,
    #[serde(rename = "PrivateRootName")]
    private_root_name: String,
}

impl RootState {
    pub fn to_json(&self) -> Result<String, FsError> {
        let engine = base64::engine::general_purpose::STANDARD;
        let record = RootStateRecord {
            root_cid: self.root_cid.to_string(),
            root_key: engine.encode(self.root_key.bytes()),
            private_root_name: self.private_root_name.to_base64(),
        };
        serde_json::to_string_pretty(&record)
            .map_err(|err| anyhow::anyhow!("encoding root state: {}", err).into())
    }

    pub fn from_json(json: &str) -> Result<Self, FsError> {
        let record: RootStateRecord = serde_json::from_str(json)
            .map_err(|err| anyhow::anyhow!("decoding root state: {}", err))?;
        let engine = base64::engine::general_purpose::STANDARD;
        let key_bytes = engine
            .decode(&record.root_key)
            .map_err(|err| anyhow::anyhow!("decoding root key: {}", err))?;
        Ok(RootState {
            root_cid: Cid::from_str(&record.root_cid)?,
            root_key: Key::from_slice(&key_bytes)?,
            private_root_name: PrivateName::from_base64(&record.private_root_name)
                .map_err(|err| anyhow::anyhow!("decoding private root name: {}", err))?,
        })
    }

    /// Read a state file, returning `None` when it does not exist
    pub async fn load(path: &StdPath) -> Result<Option<Self>, FsError> {
        match tokio::fs::read_to_string(path).await {
            Ok(json) => Ok(Some(Self::from_json(&json)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn write(&self, path: &StdPath) -> Result<(), FsError> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(path, self.to_json()?).await?;
        Ok(())
    }
}
