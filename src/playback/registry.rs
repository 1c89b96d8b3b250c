use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use crate::{
    api::api_types::GroupId,
    playback::{
        session::{PlaybackSession, SessionHandle},
        transport::VoiceTransport,
    },
};

pub(crate) struct RegistryInner {
    next_session_id: AtomicU64,
    sessions: Mutex<HashMap<GroupId, SessionHandle>>,
    transport: Arc<dyn VoiceTransport>,
}

impl RegistryInner {
    /// Removes `group_id`'s entry, but only if it still belongs to the
    /// session asking.
    pub(crate) fn release(&self, group_id: GroupId, session_id: u64) {
        let mut sessions = self.lock();
        if sessions
            .get(&group_id)
            .is_some_and(|handle| handle.session_id() == session_id)
        {
            sessions.remove(&group_id);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<GroupId, SessionHandle>> {
        // the map is always left consistent, so a panic elsewhere while
        // holding the lock doesn't invalidate it
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One playback session per group, created on first use.
///
/// The lock here only guards the map itself. It is never held while a
/// session does any work, so a busy group can't hold up any other.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    pub fn new(transport: Arc<dyn VoiceTransport>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                next_session_id: AtomicU64::new(1),
                sessions: Mutex::new(HashMap::new()),
                transport,
            }),
        }
    }

    /// Returns the group's session, starting a fresh idle one if there is
    /// none or the old one has shut down.
    pub fn get_or_create(&self, group_id: GroupId) -> SessionHandle {
        let mut sessions = self.inner.lock();
        if let Some(handle) = sessions.get(&group_id).filter(|h| !h.is_closed()) {
            return handle.clone();
        }

        let session_id = self.inner.next_session_id.fetch_add(1, Ordering::Relaxed);
        let handle = PlaybackSession::spawn(
            group_id,
            session_id,
            self.inner.transport.clone(),
            Arc::downgrade(&self.inner),
        );
        sessions.insert(group_id, handle.clone());
        handle
    }

    /// Looks up a live session without creating one.
    pub fn get(&self, group_id: GroupId) -> Option<SessionHandle> {
        self.inner
            .lock()
            .get(&group_id)
            .filter(|h| !h.is_closed())
            .cloned()
    }

    /// Detaches the group's session and tells it to tear down.
    pub fn remove(&self, group_id: GroupId) -> Option<SessionHandle> {
        let handle = self.inner.lock().remove(&group_id);
        if let Some(handle) = &handle {
            handle.close();
        }
        handle
    }

    /// Groups which currently have a live session.
    pub fn groups(&self) -> Vec<GroupId> {
        self.inner
            .lock()
            .iter()
            .filter(|(_, handle)| !handle.is_closed())
            .map(|(group_id, _)| *group_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::api::api_types::SessionState;
    use crate::model::track::track_in;
    use crate::test_support::{channel, FakeTransport};

    #[tokio::test]
    async fn test_get_or_create_reuses_session() {
        let registry = SessionRegistry::new(FakeTransport::new());
        assert!(registry.get(1).is_none());

        let first = registry.get_or_create(1);
        let again = registry.get_or_create(1);
        let other = registry.get_or_create(2);
        assert_eq!(first.session_id(), again.session_id());
        assert_ne!(first.session_id(), other.session_id());
        assert_eq!(registry.get(1).unwrap().session_id(), first.session_id());

        let mut groups = registry.groups();
        groups.sort();
        assert_eq!(groups, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_closed_session_is_replaced() {
        let registry = SessionRegistry::new(FakeTransport::new());
        let first = registry.get_or_create(1);
        first.leave().await;
        assert!(registry.get(1).is_none());

        let second = registry.get_or_create(1);
        assert_ne!(first.session_id(), second.session_id());
        assert_eq!(second.view().await.state, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_release_ignores_other_sessions() {
        let registry = SessionRegistry::new(FakeTransport::new());
        let handle = registry.get_or_create(1);
        registry.inner.release(1, handle.session_id() + 100);
        assert!(registry.get(1).is_some());
        registry.inner.release(1, handle.session_id());
        assert!(registry.get(1).is_none());
    }

    #[tokio::test]
    async fn test_remove_tears_down() {
        let transport = FakeTransport::new();
        let registry = SessionRegistry::new(transport.clone());
        let dir = tempfile::tempdir().unwrap();
        let session = registry.get_or_create(1);
        session.connect(channel(10)).await.unwrap();
        let a = session.enqueue(track_in(dir.path(), "a")).await.unwrap();

        let removed = registry.remove(1).unwrap();
        assert!(registry.get(1).is_none());
        assert_eq!(removed.view().await.state, SessionState::Closed);
        assert!(!a.file_path.exists());
        assert_eq!(transport.disconnect_count(), 1);
        assert!(registry.remove(1).is_none());
    }

    #[tokio::test]
    async fn test_groups_do_not_block_each_other() {
        let transport = FakeTransport::new();
        let registry = SessionRegistry::new(transport.clone());
        let dir = tempfile::tempdir().unwrap();
        let gate = transport.block_connect(10);

        // group 1 is stuck connecting
        let stuck = registry.get_or_create(1);
        let stuck_connect = tokio::spawn(async move { stuck.connect(channel(10)).await });

        // group 2 gets on with it
        let session = registry.get_or_create(2);
        tokio::time::timeout(Duration::from_secs(1), async {
            session.connect(channel(20)).await.unwrap();
            session.enqueue(track_in(dir.path(), "b")).await.unwrap();
            assert_eq!(session.view().await.state, SessionState::Playing);
        })
        .await
        .unwrap();
        assert!(!stuck_connect.is_finished());

        gate.notify_one();
        stuck_connect.await.unwrap().unwrap();
        assert_eq!(
            registry.get(1).unwrap().view().await.state,
            SessionState::Connected
        );
    }
}
