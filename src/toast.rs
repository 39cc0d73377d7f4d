//! Transient user notifications.
//!
//! The store keeps a short, ordered list of toasts that a UI renders. Toasts
//! with a non-zero duration dismiss themselves; failure toasts carry an
//! optional action (e.g. "View details").

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::watch;

use crate::constants;
use crate::observable::Observable;

/// Visual severity of a toast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToastKind {
    /// Operation succeeded.
    Success,
    /// Something failed and needs attention.
    Error,
    /// Something may need attention.
    Warning,
    /// Neutral information.
    #[default]
    Info,
}

impl ToastKind {
    /// Lowercase name for rendering.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for ToastKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Button attached to a toast.
#[derive(Clone)]
pub struct ToastAction {
    /// Button text.
    pub label: String,
    /// Invoked by [`ToastStore::activate`].
    pub on_click: Arc<dyn Fn() + Send + Sync>,
}

impl ToastAction {
    /// Create an action with the given label and callback.
    pub fn new<F>(label: impl Into<String>, on_click: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            on_click: Arc::new(on_click),
        }
    }
}

impl fmt::Debug for ToastAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToastAction")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// A displayed toast.
#[derive(Debug, Clone)]
pub struct Toast {
    /// Monotonic id, unique per store.
    pub id: u64,
    /// Text shown to the user.
    pub message: String,
    /// Severity.
    pub kind: ToastKind,
    /// Optional button.
    pub action: Option<ToastAction>,
    /// Auto-dismiss delay; zero keeps the toast until removed.
    pub duration: Duration,
}

/// Options for [`ToastStore::add`].
#[derive(Debug, Clone)]
pub struct ToastOptions {
    /// Severity.
    pub kind: ToastKind,
    /// Auto-dismiss delay; zero keeps the toast until removed.
    pub duration: Duration,
    /// Optional button.
    pub action: Option<ToastAction>,
}

impl Default for ToastOptions {
    fn default() -> Self {
        Self {
            kind: ToastKind::Info,
            duration: constants::TOAST_DURATION,
            action: None,
        }
    }
}

/// Ordered, bounded list of toasts. Clones share the same list.
#[derive(Debug, Clone)]
pub struct ToastStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    toasts: Observable<Vec<Toast>>,
    next_id: AtomicU64,
    max_toasts: usize,
}

impl Default for ToastStore {
    fn default() -> Self {
        Self::new(constants::MAX_TOASTS)
    }
}

impl ToastStore {
    /// Create a store keeping at most `max_toasts` toasts (minimum 1).
    pub fn new(max_toasts: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                toasts: Observable::new(Vec::new()),
                next_id: AtomicU64::new(1),
                max_toasts: max_toasts.max(1),
            }),
        }
    }

    /// Show a toast and return its id.
    ///
    /// The oldest toasts are dropped once the store is full. Auto-dismiss is
    /// scheduled only when called from within a Tokio runtime.
    pub fn add(&self, message: impl Into<String>, options: ToastOptions) -> u64 {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let toast = Toast {
            id,
            message: message.into(),
            kind: options.kind,
            action: options.action,
            duration: options.duration,
        };
        let max = self.inner.max_toasts;

        self.inner.toasts.update(|current| {
            let skip = (current.len() + 1).saturating_sub(max);
            current
                .iter()
                .skip(skip)
                .cloned()
                .chain(std::iter::once(toast))
                .collect()
        });

        if !options.duration.is_zero() {
            self.schedule_dismiss(id, options.duration);
        }
        id
    }

    fn schedule_dismiss(&self, id: u64, after: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::debug!("No runtime; toast {} will not auto-dismiss", id);
            return;
        };
        let store: Weak<Inner> = Arc::downgrade(&self.inner);
        runtime.spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(inner) = store.upgrade() {
                ToastStore { inner }.remove(id);
            }
        });
    }

    /// Dismiss the toast with `id`. Returns `false` if it was not shown.
    pub fn remove(&self, id: u64) -> bool {
        if !self.inner.toasts.get().iter().any(|t| t.id == id) {
            return false;
        }
        self.inner
            .toasts
            .update(|current| current.iter().filter(|t| t.id != id).cloned().collect());
        true
    }

    /// Dismiss every toast.
    pub fn clear(&self) {
        self.inner.toasts.replace(Vec::new());
    }

    /// Current toasts, oldest first.
    pub fn toasts(&self) -> Arc<Vec<Toast>> {
        self.inner.toasts.get()
    }

    /// Run the action of toast `id` and dismiss it.
    ///
    /// Returns `false` if the toast is gone or has no action.
    pub fn activate(&self, id: u64) -> bool {
        let action = self
            .toasts()
            .iter()
            .find(|t| t.id == id)
            .and_then(|t| t.action.clone());
        let Some(action) = action else {
            return false;
        };
        (action.on_click)();
        self.remove(id);
        true
    }

    /// Change notifications for the toast list.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Toast>>> {
        self.inner.toasts.subscribe()
    }
}
