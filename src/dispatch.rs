use crate::protocol::{verb, Frame, Topic};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Callback invoked with each matching notification record
pub type Callback = Arc<dyn Fn(Arc<Frame>) + Send + Sync>;

/// Handle returned by `subscribe`, used to remove the subscription later
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    topic: Topic,
    id: Uuid,
}

impl SubscriptionHandle {
    /// Topic this handle is subscribed to
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

/// Per-topic callback registry.
///
/// Callbacks are invoked in registration order. The registry lock is never
/// held while a callback runs, so a callback may re-enter the session. A
/// panicking callback is caught, reported on the error topic, and never
/// disturbs other subscribers.
#[derive(Default)]
pub struct Dispatcher {
    subscriptions: Mutex<HashMap<Topic, Vec<(Uuid, Callback)>>>,
}

impl Dispatcher {
    /// Register a callback for a topic
    pub fn subscribe(
        &self,
        topic: Topic,
        callback: impl Fn(Arc<Frame>) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        let id = Uuid::new_v4();
        self.subscriptions
            .lock()
            .unwrap()
            .entry(topic)
            .or_default()
            .push((id, Arc::new(callback)));
        SubscriptionHandle { topic, id }
    }

    /// Remove a subscription; returns false if it was already gone
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let mut subs = self.subscriptions.lock().unwrap();
        let Some(list) = subs.get_mut(&handle.topic) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != handle.id);
        list.len() != before
    }

    /// Invoke every callback registered for `topic` with the record
    pub(crate) fn dispatch(&self, topic: Topic, frame: &Arc<Frame>) {
        // snapshot under the lock, invoke outside it
        let callbacks: Vec<Callback> = {
            let subs = self.subscriptions.lock().unwrap();
            match subs.get(&topic) {
                Some(list) => list.iter().map(|(_, cb)| cb.clone()).collect(),
                None => return,
            }
        };

        for callback in callbacks {
            let frame = frame.clone();
            if catch_unwind(AssertUnwindSafe(|| callback(frame))).is_err() {
                tracing::error!(%topic, "subscriber callback panicked");
                if topic != Topic::Error {
                    let report = Arc::new(Frame {
                        verb: verb::ERROR.to_string(),
                        key: None,
                        fields: vec![(
                            "message".to_string(),
                            format!("subscriber callback for topic {topic} panicked"),
                        )],
                        raw: Vec::new(),
                    });
                    self.dispatch(Topic::Error, &report);
                }
            }
        }
    }
}
