//! Remote object proxies.
//!
//! A [`RemoteObject`] stands in for a server-side object. Clones share one
//! underlying handle; when the last clone goes away the handle is returned
//! to the client that issued it, which sends exactly one Release for it.
//!
//! ```text
//! decode ObjectHandle ─► RemoteObject ─┬─ clone ─┐
//!                                      └─ drop ──┴─► last drop ─► Release(id)
//! ```
//!
//! Because release is tied to the last reference, a handle can never be
//! used after its Release has been scheduled.

use std::fmt;
use std::sync::{Arc, Weak};

/// Receives handles whose last proxy has gone away.
pub(crate) trait ReleaseSink: Send + Sync {
    /// Release `id` on the server, now or as soon as the connection is free.
    fn release(&self, id: i32);
}

struct HandleInner {
    id: i32,
    class_name: Option<String>,
    /// Client that issued the handle; 0 for detached handles.
    owner: u64,
    /// `None` once the release has been taken over explicitly.
    sink: Option<Weak<dyn ReleaseSink>>,
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take().and_then(|weak| weak.upgrade()) {
            sink.release(self.id);
        }
    }
}

/// Proxy for a server-side object.
#[derive(Clone)]
pub struct RemoteObject {
    inner: Arc<HandleInner>,
}

impl RemoteObject {
    /// Create a proxy that releases through `sink`.
    pub(crate) fn new(
        id: i32,
        class_name: Option<String>,
        owner: u64,
        sink: Weak<dyn ReleaseSink>,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id,
                class_name,
                owner,
                sink: Some(sink),
            }),
        }
    }

    /// Create a proxy that never sends a release.
    pub(crate) fn detached(id: i32, class_name: Option<String>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id,
                class_name,
                owner: 0,
                sink: None,
            }),
        }
    }

    /// Server-side handle id.
    #[inline]
    pub fn id(&self) -> i32 {
        self.inner.id
    }

    /// Class name, when the server reported one.
    #[inline]
    pub fn class_name(&self) -> Option<&str> {
        self.inner.class_name.as_deref()
    }

    /// Id of the client that issued this handle.
    #[inline]
    pub(crate) fn owner(&self) -> u64 {
        self.inner.owner
    }

    /// Number of live clones of this proxy.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Give up this reference.
    ///
    /// Returns the handle id if this was the last reference; the caller is
    /// then responsible for the release. Otherwise the remaining clones keep
    /// the handle alive and `None` is returned.
    pub(crate) fn take_last(self) -> Option<i32> {
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                inner.sink = None;
                Some(inner.id)
            }
            Err(_) => None,
        }
    }
}

impl PartialEq for RemoteObject {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id && self.inner.owner == other.inner.owner
    }
}

impl fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteObject")
            .field("id", &self.inner.id)
            .field("class_name", &self.inner.class_name)
            .finish()
    }
}

impl fmt::Display for RemoteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.class_name {
            Some(class) => write!(f, "<{} #{}>", class, self.inner.id),
            None => write!(f, "<object #{}>", self.inner.id),
        }
    }
}
