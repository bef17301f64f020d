use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

pub const BLOB_URL_PREFIX: &str = "blob:audio-quiz/";

/// Bytes behind one object URL
#[derive(Debug, Clone, PartialEq)]
pub struct BlobData {
    pub bytes: Vec<u8>,
    pub duration: Duration,
    pub mime: String,
}

impl BlobData {
    pub fn new(bytes: Vec<u8>, duration: Duration, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            duration,
            mime: mime.into(),
        }
    }
}

/// Registry of in-memory audio addressed by `blob:` URLs
pub struct BlobStore {
    entries: Mutex<HashMap<String, Arc<BlobData>>>,
    next_id: AtomicU64,
}

impl BlobStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Register `data` and hand out the owning handle
    pub fn create(self: &Arc<Self>, data: BlobData) -> AudioBlob {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let url = format!("{}{}", BLOB_URL_PREFIX, id);
        let duration = data.duration;
        self.lock().insert(url.clone(), Arc::new(data));

        AudioBlob {
            inner: Arc::new(BlobHandle {
                url,
                duration,
                store: Arc::downgrade(self),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn get(&self, url: &str) -> Option<Arc<BlobData>> {
        self.lock().get(url).cloned()
    }

    pub fn is_live(&self, url: &str) -> bool {
        self.lock().contains_key(url)
    }

    pub fn live_count(&self) -> usize {
        self.lock().len()
    }

    pub fn live_bytes(&self) -> usize {
        self.lock().values().map(|data| data.bytes.len()).sum()
    }

    fn release(&self, url: &str) -> bool {
        self.lock().remove(url).is_some()
    }

    // Disposal must not fail, so a poisoned map is still used
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<BlobData>>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

struct BlobHandle {
    url: String,
    duration: Duration,
    store: Weak<BlobStore>,
    disposed: AtomicBool,
}

impl BlobHandle {
    fn release(&self) -> bool {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        match self.store.upgrade() {
            Some(store) => store.release(&self.url),
            None => false,
        }
    }
}

impl Drop for BlobHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Shared handle to a blob URL; the entry is released on `dispose()` or when the last clone drops
#[derive(Clone)]
pub struct AudioBlob {
    inner: Arc<BlobHandle>,
}

impl AudioBlob {
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn duration(&self) -> Duration {
        self.inner.duration
    }

    /// Release the URL. Safe to call any number of times from any clone.
    /// Returns true only for the call that actually released it.
    pub fn dispose(&self) -> bool {
        self.inner.release()
    }

    pub fn is_disposed(&self) -> bool {
        if self.inner.disposed.load(Ordering::Acquire) {
            return true;
        }
        match self.inner.store.upgrade() {
            Some(store) => !store.is_live(&self.inner.url),
            None => true,
        }
    }

    pub fn data(&self) -> Option<Arc<BlobData>> {
        if self.inner.disposed.load(Ordering::Acquire) {
            return None;
        }
        self.inner.store.upgrade()?.get(&self.inner.url)
    }
}

impl PartialEq for AudioBlob {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for AudioBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioBlob")
            .field("url", &self.inner.url)
            .field("duration", &self.inner.duration)
            .field("disposed", &self.inner.disposed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Dispose every blob, returning how many were actually released
pub fn dispose_all<'a>(blobs: impl IntoIterator<Item = &'a AudioBlob>) -> usize {
    blobs.into_iter().filter(|blob| blob.dispose()).count()
}
