use crate::protocol::Frame;
use std::sync::Arc;
use tokio::sync::oneshot;
use uuid::Uuid;

/// One command awaiting its reply
struct PendingCommand {
    id: Uuid,
    verb: String,
    key: Option<String>,
    tx: oneshot::Sender<Arc<Frame>>,
}

/// The set of outstanding commands, in issue order.
///
/// LWRP carries no transaction identifier, so a reply is recognized by verb
/// equality plus key equality where the command carried one. Among equal
/// matches the oldest entry wins (FIFO). A second command issued for the
/// same verb+key simply queues behind the first.
#[derive(Default)]
pub(crate) struct PendingTable {
    entries: Vec<PendingCommand>,
}

impl PendingTable {
    /// Register a waiter; the returned id is used to remove it on timeout
    pub fn insert(
        &mut self,
        verb: impl Into<String>,
        key: Option<String>,
        tx: oneshot::Sender<Arc<Frame>>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.entries.push(PendingCommand {
            id,
            verb: verb.into(),
            key,
            tx,
        });
        id
    }

    /// Match an inbound frame against the oldest compatible waiter.
    ///
    /// Returns the waiter's completion channel if the frame is a reply, or
    /// `None` if the frame is unsolicited.
    pub fn complete(&mut self, frame: &Frame) -> Option<oneshot::Sender<Arc<Frame>>> {
        let pos = self.entries.iter().position(|p| {
            p.verb == frame.verb
                && match &p.key {
                    Some(key) => frame.key.as_deref() == Some(key.as_str()),
                    None => true,
                }
        })?;
        Some(self.entries.remove(pos).tx)
    }

    /// Drop a waiter that gave up (timeout); a late reply will then be
    /// treated as unsolicited
    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.entries.len();
        self.entries.retain(|p| p.id != id);
        self.entries.len() != before
    }

    /// Fail every waiter by dropping its completion channel
    pub fn fail_all(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(verb: &str, key: Option<&str>) -> Frame {
        Frame {
            verb: verb.to_string(),
            key: key.map(str::to_string),
            ..Frame::default()
        }
    }

    #[test]
    fn matches_by_verb_and_key() {
        let mut table = PendingTable::default();
        let (tx, _rx) = oneshot::channel();
        table.insert("SOURCE", Some("1".into()), tx);

        assert!(table.complete(&frame("SOURCE", Some("2"))).is_none());
        assert!(table.complete(&frame("GPO", Some("1"))).is_none());
        assert!(table.complete(&frame("SOURCE", Some("1"))).is_some());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn keyless_waiter_matches_any_key() {
        let mut table = PendingTable::default();
        let (tx, _rx) = oneshot::channel();
        table.insert("LOGIN", None, tx);

        assert!(table.complete(&frame("LOGIN", Some("OK"))).is_some());
    }

    #[test]
    fn fifo_tie_break_for_equal_matches() {
        let mut table = PendingTable::default();
        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();
        table.insert("GPO", Some("1".into()), tx1);
        table.insert("GPO", Some("1".into()), tx2);

        let reply = Arc::new(frame("GPO", Some("1")));
        table.complete(&reply).unwrap().send(reply.clone()).unwrap();
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());

        table.complete(&reply).unwrap().send(reply.clone()).unwrap();
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn removed_waiter_no_longer_matches() {
        let mut table = PendingTable::default();
        let (tx, _rx) = oneshot::channel();
        let id = table.insert("VER", None, tx);

        assert!(table.remove(id));
        assert!(!table.remove(id));
        assert!(table.complete(&frame("VER", None)).is_none());
    }

    #[test]
    fn fail_all_drops_completion_channels() {
        let mut table = PendingTable::default();
        let (tx, mut rx) = oneshot::channel();
        table.insert("VER", None, tx);

        table.fail_all();
        assert!(matches!(
            rx.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }
}
