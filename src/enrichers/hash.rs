//! SHA-256 of every archived file

use super::{apply_by_position, media_positions};
use crate::backends::Enricher;
use crate::context::ArchivingContext;
use crate::error::{Error, Result};
use crate::metadata::Metadata;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Sets `hash = "SHA-256:<hex>"` on every primary media
pub struct HashEnricher {
    chunk_size: usize,
}

impl HashEnricher {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(4096),
        }
    }
}

/// Hash a file in `chunk_size` reads on the blocking pool
pub async fn hash_file(path: &Path, chunk_size: usize) -> Result<String> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<String> {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; chunk_size];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(format!("SHA-256:{:x}", hasher.finalize()))
    })
    .await
    .map_err(|e| Error::Other(format!("hash task failed: {}", e)))?
}

#[async_trait]
impl Enricher for HashEnricher {
    fn name(&self) -> &str {
        "hash_enricher"
    }

    async fn enrich(&self, item: &mut Metadata, _ctx: &ArchivingContext) -> Result<()> {
        let targets = media_positions(item, |m| m.is_primary());

        let mut hashes = HashMap::new();
        for (pos, path) in targets {
            match hash_file(&path, self.chunk_size).await {
                Ok(hash) => {
                    hashes.insert(pos, hash);
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "Could not hash media");
                }
            }
        }

        apply_by_position(item, |m, pos| {
            if let Some(hash) = hashes.remove(&pos) {
                m.set("hash", hash);
            }
        });
        Ok(())
    }
}
