//! Fetch-and-cache for the block-list document.
//!
//! Keeps a local copy of a remote list, hands new content to an update
//! callback and refreshes it on a fixed interval from a background thread.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use log::{debug, info, warn};
use parking_lot::Mutex;
use url::Url;

use crate::error::{FetchErrorKind, ListError, Result};

/// Callback invoked with each new version of the document
type UpdateCallback = Box<dyn Fn(&mut dyn Read) -> Result<()> + Send + Sync>;

/// Default interval between list refreshes: 5 minutes
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default timeout for one list download
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

struct Fetcher {
    url: String,
    path: PathBuf,
    check_interval: Duration,
    agent: ureq::Agent,
    on_update: UpdateCallback,
    // Serializes updates: one download + callback at a time
    update_lock: Mutex<()>,
}

impl Fetcher {
    /// Hand the cached file to the callback. Returns false when there is no
    /// usable cache file.
    fn load_cached(&self) -> Result<bool> {
        let _lock = self.update_lock.lock();
        match fs::metadata(&self.path) {
            Ok(meta) if meta.len() > 0 => {}
            _ => return Ok(false),
        }

        debug!("Loading cached list from {}", self.path.display());
        let mut file = fs::File::open(&self.path)?;
        (self.on_update)(&mut file)?;
        Ok(true)
    }

    /// Check if the cache file is missing, empty or older than the interval
    fn is_stale(&self) -> bool {
        match fs::metadata(&self.path) {
            Ok(meta) => {
                if meta.len() == 0 {
                    return true;
                }
                match meta.modified() {
                    Ok(mtime) => SystemTime::now()
                        .duration_since(mtime)
                        .map(|d| d > self.check_interval)
                        .unwrap_or(true),
                    Err(_) => true,
                }
            }
            Err(_) => true,
        }
    }

    /// Download the list and pass it to the callback. The cache file is only
    /// replaced when the callback accepts the new content. Returns false when
    /// the remote content equals the cached copy.
    fn fetch(&self) -> Result<bool> {
        let _lock = self.update_lock.lock();

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_error)?;
            }
        }

        debug!("Downloading {} from {}", self.path.display(), self.url);
        let tmp_path = tmp_path(&self.path);

        let response = self
            .agent
            .get(&self.url)
            .call()
            .map_err(|e| ListError::fetch(FetchErrorKind::Http, format!("Download failed: {}", e)))?;

        let mut file = fs::File::create(&tmp_path).map_err(io_error)?;
        let (_, body) = response.into_parts();
        let mut reader = body.into_reader();
        std::io::copy(&mut reader, &mut file).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            ListError::fetch(FetchErrorKind::Http, format!("Download interrupted: {}", e))
        })?;
        file.flush().map_err(io_error)?;
        drop(file);

        if same_content(&tmp_path, &self.path) {
            debug!("{} is unchanged", self.url);
            let _ = fs::remove_file(&tmp_path);
            // Mark the cache as fresh
            if let Ok(file) = fs::File::options().append(true).open(&self.path) {
                let _ = file.set_modified(SystemTime::now());
            }
            return Ok(false);
        }

        let update = fs::File::open(&tmp_path)
            .map_err(ListError::from)
            .and_then(|mut file| (self.on_update)(&mut file));
        if let Err(e) = update {
            let _ = fs::remove_file(&tmp_path);
            return Err(ListError::fetch(
                FetchErrorKind::Rejected,
                format!("Update rejected: {}", e),
            ));
        }

        fs::rename(&tmp_path, &self.path).map_err(io_error)?;
        info!("Downloaded {} successfully", self.path.display());
        Ok(true)
    }
}

/// Sibling of `path` with `.tmp` appended to the full file name
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn io_error(e: std::io::Error) -> ListError {
    ListError::fetch(FetchErrorKind::Io, e.to_string())
}

fn same_content(a: &Path, b: &Path) -> bool {
    match (fs::metadata(a), fs::metadata(b)) {
        (Ok(ma), Ok(mb)) if ma.len() == mb.len() => {}
        _ => return false,
    }
    match (fs::read(a), fs::read(b)) {
        (Ok(ca), Ok(cb)) => ca == cb,
        _ => false,
    }
}

/// Builder for [`UrlCache`]
pub struct UrlCacheBuilder {
    url: String,
    path: PathBuf,
    check_interval: Duration,
    fetch_timeout: Duration,
}

impl UrlCacheBuilder {
    /// Set the refresh interval
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Set the download timeout
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Load the cached copy (if any), fetch when it is missing or stale, then
    /// start refreshing in the background.
    ///
    /// Fails when no content could be loaded at all, or when the callback
    /// rejects the only content available.
    pub fn open<F>(self, on_update: F) -> Result<UrlCache>
    where
        F: Fn(&mut dyn Read) -> Result<()> + Send + Sync + 'static,
    {
        let parsed = Url::parse(&self.url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ListError::ConfigError(format!(
                "Unsupported list URL scheme: {}",
                parsed.scheme()
            )));
        }
        if self.check_interval.is_zero() {
            return Err(ListError::ConfigError(
                "Check interval must be greater than zero".to_string(),
            ));
        }

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(self.fetch_timeout))
            .build()
            .into();

        let fetcher = Arc::new(Fetcher {
            url: self.url,
            path: self.path,
            check_interval: self.check_interval,
            agent,
            on_update: Box::new(on_update),
            update_lock: Mutex::new(()),
        });

        let loaded = match fetcher.load_cached() {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!("Unable to load cached list {}: {}", fetcher.path.display(), e);
                false
            }
        };

        if !loaded || fetcher.is_stale() {
            if let Err(e) = fetcher.fetch() {
                if !loaded {
                    return Err(e);
                }
                warn!("Download failed, using cached list: {}", e);
            }
        }

        let (stop, stop_rx) = mpsc::channel::<()>();
        let worker = {
            let fetcher = Arc::clone(&fetcher);
            thread::Builder::new()
                .name("easylist-refresh".to_string())
                .spawn(move || loop {
                    match stop_rx.recv_timeout(fetcher.check_interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            if let Err(e) = fetcher.fetch() {
                                warn!("Unable to refresh {}: {}", fetcher.url, e);
                            }
                        }
                        _ => break,
                    }
                })?
        };

        Ok(UrlCache {
            fetcher,
            stop: Some(stop),
            worker: Some(worker),
        })
    }
}

/// Handle to a cached remote document. Dropping it stops the background
/// refresh.
pub struct UrlCache {
    fetcher: Arc<Fetcher>,
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl UrlCache {
    /// Start building a cache for `url` stored at `cache_file`
    pub fn builder(url: impl Into<String>, cache_file: impl AsRef<Path>) -> UrlCacheBuilder {
        UrlCacheBuilder {
            url: url.into(),
            path: cache_file.as_ref().to_path_buf(),
            check_interval: DEFAULT_CHECK_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Fetch now instead of waiting for the next interval. Returns false when
    /// the remote content was unchanged.
    pub fn refresh_now(&self) -> Result<bool> {
        self.fetcher.fetch()
    }

    /// Path of the local cache file
    pub fn cache_file(&self) -> &Path {
        &self.fetcher.path
    }
}

impl Drop for UrlCache {
    fn drop(&mut self) {
        // Closing the channel wakes the worker
        drop(self.stop.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
