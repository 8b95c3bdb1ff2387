//! Callback registration for "frame loaded", "content loaded", and
//! "contraction ready" notifications.
//!
//! Subscribers are kept in an ordered list and invoked synchronously on the
//! thread that emits the event, in registration order.

use std::sync::{Mutex, PoisonError};

/// Handle returned on registration. Can be used to unsubscribe again.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<E> = Box<dyn Fn(&E) + Send + Sync + 'static>;

/// Ordered list of subscribers for events of type `E`.
pub struct Subscribers<E: ?Sized> {
    inner: Mutex<SubscriberList<E>>,
}

struct SubscriberList<E: ?Sized> {
    next_id: u64,
    callbacks: Vec<(SubscriptionId, Callback<E>)>,
}

impl<E: ?Sized> Default for Subscribers<E> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(SubscriberList {
                next_id: 0,
                callbacks: Vec::new(),
            }),
        }
    }
}

impl<E: ?Sized> core::fmt::Debug for Subscribers<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscribers")
            .field("len", &self.len())
            .finish()
    }
}

impl<E: ?Sized> Subscribers<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a callback to the end of the list.
    pub fn register(&self, callback: impl Fn(&E) + Send + Sync + 'static) -> SubscriptionId {
        let mut list = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = SubscriptionId(list.next_id);
        list.next_id += 1;
        list.callbacks.push((id, Box::new(callback)));
        id
    }

    /// Removes a callback. Returns `false` if it was not registered.
    pub fn unregister(&self, id: SubscriptionId) -> bool {
        let mut list = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let len_before = list.callbacks.len();
        list.callbacks.retain(|(other, _)| *other != id);
        list.callbacks.len() != len_before
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .callbacks
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes all callbacks in registration order.
    ///
    /// Callbacks must not register or unregister on the same list.
    pub fn emit(&self, event: &E) {
        let list = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, callback) in &list.callbacks {
            callback(event);
        }
    }
}
