//! Change notification for presentation layers.
//!
//! Listeners receive an owned [`FormSnapshot`] after every state change and are
//! called synchronously, in registration order, with no form lock held. A
//! listener may therefore read or mutate the form it observes.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use tracing::warn;

use super::controller::{FormResult, FormSnapshot, write_lock};
use super::model::FormModel;

pub(super) type Listener<T> = Arc<dyn Fn(&FormSnapshot<T>) + Send + Sync>;

type ListenerMap<T> = RwLock<BTreeMap<u64, Listener<T>>>;

pub(super) struct Listeners<T> {
    next_id: Arc<AtomicU64>,
    entries: Arc<ListenerMap<T>>,
}

impl<T> Clone for Listeners<T> {
    fn clone(&self) -> Self {
        Self {
            next_id: self.next_id.clone(),
            entries: self.entries.clone(),
        }
    }
}

impl<T> Listeners<T>
where
    T: FormModel,
{
    pub(super) fn new() -> Self {
        Self {
            next_id: Arc::new(AtomicU64::new(1)),
            entries: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    pub(super) fn add(&self, listener: Listener<T>) -> FormResult<Subscription> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        write_lock(&self.entries, "registering listener")?.insert(id, listener);

        let entries: Weak<ListenerMap<T>> = Arc::downgrade(&self.entries);
        Ok(Subscription {
            id,
            cancel: Some(Box::new(move || {
                let Some(entries) = entries.upgrade() else {
                    return;
                };
                let mut entries = match entries.write() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                entries.remove(&id);
            })),
        })
    }

    pub(super) fn is_empty(&self) -> bool {
        match self.entries.read() {
            Ok(guard) => guard.is_empty(),
            Err(poisoned) => poisoned.into_inner().is_empty(),
        }
    }

    pub(super) fn emit(&self, snapshot: &FormSnapshot<T>) {
        let listeners: Vec<(u64, Listener<T>)> = {
            let guard = match self.entries.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard
                .iter()
                .map(|(id, listener)| (*id, listener.clone()))
                .collect()
        };

        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(snapshot))).is_err() {
                warn!(listener = id, "form listener panicked");
            }
        }
    }
}

/// Keeps a listener registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Keeps the listener registered for the lifetime of the form.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
