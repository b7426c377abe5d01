//! The file source abstraction and its cancellation primitive.
//!
//! A file source answers a [`Resource`] request with a [`Response`] through
//! a callback and hands back a [`RequestHandle`]. There is no cancel
//! method: dropping the handle is the cancellation, and it is atomic with
//! respect to delivery, so a dropped request never invokes its callback.

use std::sync::{Arc, Mutex};

use tokio::task::AbortHandle;

use crate::resource::Resource;
use crate::response::Response;

/// Receives responses for one request. May be invoked more than once when a
/// cached answer is followed by a fresh one.
pub type ResponseCallback = Box<dyn FnMut(Response) + Send>;

#[derive(Default)]
pub(crate) struct CallbackState {
    cancelled: bool,
    callback: Option<ResponseCallback>,
}

/// Shared single-slot callback storage; the handle empties it on drop.
pub(crate) type CallbackSlot = Arc<Mutex<CallbackState>>;

pub(crate) fn new_slot(callback: ResponseCallback) -> CallbackSlot {
    Arc::new(Mutex::new(CallbackState {
        cancelled: false,
        callback: Some(callback),
    }))
}

/// Invokes the slot's callback unless the request was cancelled.
///
/// The callback is taken out of the slot while it runs so it may itself
/// drop the handle without deadlocking; a cancellation that lands mid-call
/// keeps the callback from being restored afterwards.
pub(crate) fn deliver(slot: &CallbackSlot, response: Response) {
    let callback = {
        let mut state = slot.lock().unwrap();
        if state.cancelled {
            return;
        }
        state.callback.take()
    };
    if let Some(mut callback) = callback {
        callback(response);
        let mut state = slot.lock().unwrap();
        if !state.cancelled {
            state.callback = Some(callback);
        }
    }
}

/// Issues requests for resources.
///
/// Implementations deliver responses asynchronously, handle their own
/// retry policy for transient failures, and never invoke the callback of a
/// cancelled request.
pub trait FileSource: Send + Sync {
    fn request(&self, resource: Resource, callback: ResponseCallback) -> RequestHandle;
}

/// Keeps a request alive. Dropping it cancels the request: the callback
/// slot is emptied, the driving task aborted, and any chained follow-up
/// request dropped in turn.
pub struct RequestHandle {
    slot: CallbackSlot,
    abort: Option<AbortHandle>,
    chained: Arc<Mutex<Option<RequestHandle>>>,
}

impl RequestHandle {
    pub(crate) fn new(slot: CallbackSlot, abort: Option<AbortHandle>) -> Self {
        Self {
            slot,
            abort,
            chained: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn set_abort(&mut self, abort: AbortHandle) {
        self.abort = Some(abort);
    }

    /// Slot for a follow-up request spawned after this handle was handed
    /// out; the facade parks the online request here so one drop cancels
    /// the whole chain.
    pub(crate) fn chained(&self) -> Arc<Mutex<Option<RequestHandle>>> {
        Arc::clone(&self.chained)
    }
}

impl Drop for RequestHandle {
    fn drop(&mut self) {
        {
            let mut state = self.slot.lock().unwrap();
            state.cancelled = true;
            state.callback = None;
        }
        if let Some(abort) = &self.abort {
            abort.abort();
        }
        self.chained.lock().unwrap().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_slot() -> (CallbackSlot, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let slot = new_slot(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        (slot, count)
    }

    #[test]
    fn test_deliver_invokes_callback() {
        let (slot, count) = counting_slot();
        deliver(&slot, Response::from_data("a"));
        deliver(&slot, Response::from_data("b"));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dropped_handle_suppresses_delivery() {
        let (slot, count) = counting_slot();
        let handle = RequestHandle::new(Arc::clone(&slot), None);
        drop(handle);
        deliver(&slot, Response::from_data("a"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_callback_may_drop_its_own_handle() {
        let slot: CallbackSlot = Arc::new(Mutex::new(CallbackState::default()));
        let handle = RequestHandle::new(Arc::clone(&slot), None);
        let handle = Arc::new(Mutex::new(Some(handle)));
        let captured = Arc::clone(&handle);
        slot.lock().unwrap().callback = Some(Box::new(move |_| {
            captured.lock().unwrap().take();
        }));

        deliver(&slot, Response::from_data("a"));
        // The drop inside the callback cancelled the slot for good.
        assert!(slot.lock().unwrap().callback.is_none());
        assert!(handle.lock().unwrap().is_none());
    }
}
