use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use murmur_core::error::{MurmurError, Result};

/// One file in a remote model repository's manifest.
///
/// `size` is `0` when the hub omits size metadata for the file; totals built
/// from manifests may therefore undercount, which only affects displayed
/// percentages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubFile {
    pub name: String,
    pub size: u64,
}

/// Remote model hub capability: list a repository's files and fetch them.
///
/// Implementations block; callers run them on a blocking context. `progress`
/// receives the cumulative bytes transferred for the current file and is not
/// invoked at all when the file is already fully cached on disk.
pub trait ModelHub: Send + Sync {
    fn list_files(&self, repo_id: &str) -> Result<Vec<HubFile>>;

    fn fetch_file(
        &self,
        repo_id: &str,
        file: &HubFile,
        dest_dir: &Path,
        progress: &mut dyn FnMut(u64),
    ) -> Result<()>;
}

const HUB_ENDPOINT: &str = "https://huggingface.co";
const FETCH_BUFFER_SIZE: usize = 8192;

/// HTTP hub client backed by the Hugging Face Hub API.
///
/// Manifests come from `/api/models/<repo>?blobs=true` (which includes file
/// sizes); file content streams from `/<repo>/resolve/main/<file>`. Files
/// land next to a `.download` temp name and are renamed only once complete,
/// so a crashed transfer never leaves a plausible-looking weights file.
pub struct HttpHub {
    agent: ureq::Agent,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    #[serde(default)]
    siblings: Vec<Sibling>,
}

#[derive(Debug, Deserialize)]
struct Sibling {
    rfilename: String,
    #[serde(default)]
    size: Option<u64>,
}

impl HttpHub {
    pub fn new() -> Self {
        Self::with_endpoint(HUB_ENDPOINT)
    }

    /// Point the client at a different hub host (mirrors, test servers).
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        let config = ureq::config::Config::builder()
            .timeout_global(Some(Duration::from_secs(30)))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            endpoint: endpoint.into(),
        }
    }
}

impl Default for HttpHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelHub for HttpHub {
    fn list_files(&self, repo_id: &str) -> Result<Vec<HubFile>> {
        let url = format!("{}/api/models/{}?blobs=true", self.endpoint, repo_id);
        let response = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| MurmurError::Download(format!("{}: request failed: {}", repo_id, e)))?;

        let status = response.status();
        if !(200..300).contains(&status.as_u16()) {
            return Err(MurmurError::Download(format!(
                "{}: manifest request returned status {}",
                repo_id, status
            )));
        }

        let mut body = String::new();
        response
            .into_body()
            .into_reader()
            .read_to_string(&mut body)
            .map_err(|e| MurmurError::Download(format!("{}: manifest read failed: {}", repo_id, e)))?;

        let manifest: RepoInfo = serde_json::from_str(&body)
            .map_err(|e| MurmurError::Download(format!("{}: manifest parse failed: {}", repo_id, e)))?;

        let files: Vec<HubFile> = manifest
            .siblings
            .into_iter()
            .map(|s| HubFile {
                name: s.rfilename,
                size: s.size.unwrap_or(0),
            })
            .collect();

        debug!(repo = %repo_id, files = files.len(), "Hub manifest listed");
        Ok(files)
    }

    fn fetch_file(
        &self,
        repo_id: &str,
        file: &HubFile,
        dest_dir: &Path,
        progress: &mut dyn FnMut(u64),
    ) -> Result<()> {
        let dest = dest_dir.join(&file.name);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // A file of the expected size is a cache hit: no transfer, no
        // progress callbacks. Zero-size metadata can't be verified, so those
        // files are always re-fetched.
        if file.size > 0 {
            if let Ok(meta) = std::fs::metadata(&dest) {
                if meta.len() == file.size {
                    debug!(file = %file.name, "File already cached, skipping transfer");
                    return Ok(());
                }
            }
        }

        let url = format!(
            "{}/{}/resolve/main/{}",
            self.endpoint, repo_id, file.name
        );
        let response = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| MurmurError::Download(format!("{}: request failed: {}", file.name, e)))?;

        let status = response.status();
        if !(200..300).contains(&status.as_u16()) {
            return Err(MurmurError::Download(format!(
                "{}: fetch returned status {}",
                file.name, status
            )));
        }

        let tmp = dest.with_extension("download");
        let mut out = std::fs::File::create(&tmp)?;
        let mut reader = response.into_body().into_reader();
        let mut buffer = [0u8; FETCH_BUFFER_SIZE];
        let mut transferred: u64 = 0;

        loop {
            let n = reader
                .read(&mut buffer)
                .map_err(|e| MurmurError::Download(format!("{}: read failed: {}", file.name, e)))?;
            if n == 0 {
                break;
            }
            out.write_all(&buffer[..n])
                .map_err(|e| MurmurError::Download(format!("{}: write failed: {}", file.name, e)))?;
            transferred += n as u64;
            progress(transferred);
        }
        drop(out);
        std::fs::rename(&tmp, &dest)?;

        info!(file = %file.name, bytes = transferred, "File fetched");
        Ok(())
    }
}

/// In-memory hub for tests. Fetched files are written as zero-filled bytes of
/// the manifest size, with progress reported in fixed-size chunks.
#[derive(Default)]
pub struct MockHub {
    manifests: HashMap<String, Vec<HubFile>>,
    fail_listing: bool,
    fail_file: Option<String>,
    chunk_size: u64,
    fetched: Mutex<Vec<String>>,
}

impl MockHub {
    pub fn new() -> Self {
        Self {
            chunk_size: 64 * 1024,
            ..Self::default()
        }
    }

    pub fn with_manifest(mut self, repo_id: &str, files: Vec<HubFile>) -> Self {
        self.manifests.insert(repo_id.to_string(), files);
        self
    }

    /// Make `list_files` fail for every repository.
    pub fn with_listing_failure(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    /// Make fetching one named file fail.
    pub fn with_fetch_failure(mut self, file_name: &str) -> Self {
        self.fail_file = Some(file_name.to_string());
        self
    }

    pub fn with_chunk_size(mut self, bytes: u64) -> Self {
        self.chunk_size = bytes.max(1);
        self
    }

    /// Names of the files fetched so far, in fetch order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().expect("mock mutex poisoned").clone()
    }
}

impl ModelHub for MockHub {
    fn list_files(&self, repo_id: &str) -> Result<Vec<HubFile>> {
        if self.fail_listing {
            return Err(MurmurError::Download(format!(
                "{}: manifest unavailable",
                repo_id
            )));
        }
        self.manifests
            .get(repo_id)
            .cloned()
            .ok_or_else(|| MurmurError::Download(format!("{}: unknown repository", repo_id)))
    }

    fn fetch_file(
        &self,
        _repo_id: &str,
        file: &HubFile,
        dest_dir: &Path,
        progress: &mut dyn FnMut(u64),
    ) -> Result<()> {
        if self.fail_file.as_deref() == Some(file.name.as_str()) {
            return Err(MurmurError::Download(format!(
                "{}: simulated fetch failure",
                file.name
            )));
        }

        self.fetched
            .lock()
            .expect("mock mutex poisoned")
            .push(file.name.clone());

        let dest = dest_dir.join(&file.name);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Cache-hit path mirrors HttpHub: right-sized files transfer nothing.
        if file.size > 0 {
            if let Ok(meta) = std::fs::metadata(&dest) {
                if meta.len() == file.size {
                    return Ok(());
                }
            }
        }

        std::fs::write(&dest, vec![0u8; file.size as usize])?;

        let mut transferred = 0u64;
        while transferred < file.size {
            transferred = (transferred + self.chunk_size).min(file.size);
            progress(transferred);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_hub_lists_configured_manifest() {
        let hub = MockHub::new().with_manifest(
            "org/model",
            vec![
                HubFile {
                    name: "model.bin".to_string(),
                    size: 100,
                },
                HubFile {
                    name: "config.json".to_string(),
                    size: 10,
                },
            ],
        );

        let files = hub.list_files("org/model").unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "model.bin");
    }

    #[test]
    fn test_mock_hub_unknown_repo_errors() {
        let hub = MockHub::new();
        assert!(hub.list_files("nobody/nothing").is_err());
    }

    #[test]
    fn test_mock_hub_fetch_writes_file_and_reports_progress() {
        let dir = tempfile::tempdir().unwrap();
        let hub = MockHub::new().with_chunk_size(100);
        let file = HubFile {
            name: "weights.bin".to_string(),
            size: 250,
        };

        let mut reports = Vec::new();
        hub.fetch_file("org/model", &file, dir.path(), &mut |b| reports.push(b))
            .unwrap();

        assert_eq!(reports, vec![100, 200, 250]);
        let written = std::fs::metadata(dir.path().join("weights.bin")).unwrap();
        assert_eq!(written.len(), 250);
    }

    #[test]
    fn test_mock_hub_cached_file_reports_no_progress() {
        let dir = tempfile::tempdir().unwrap();
        let hub = MockHub::new();
        let file = HubFile {
            name: "weights.bin".to_string(),
            size: 64,
        };
        std::fs::write(dir.path().join("weights.bin"), vec![0u8; 64]).unwrap();

        let mut reports = Vec::new();
        hub.fetch_file("org/model", &file, dir.path(), &mut |b| reports.push(b))
            .unwrap();

        assert!(reports.is_empty());
    }

    #[test]
    fn test_mock_hub_fetch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let hub = MockHub::new().with_fetch_failure("weights.bin");
        let file = HubFile {
            name: "weights.bin".to_string(),
            size: 10,
        };

        let result = hub.fetch_file("org/model", &file, dir.path(), &mut |_| {});
        assert!(matches!(result, Err(MurmurError::Download(_))));
    }
}
