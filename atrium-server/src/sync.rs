//! State sync: the full-state snapshot that lets a viewer rebuild its view

use atrium_protocol::ServerMessage;

use crate::session::SessionHandle;

/// Build the state-sync message for a tab
///
/// Pure and side-effect-free: with no intervening runtime activity, two
/// calls yield equal output. The receiver discards a sync whose `tab_id`
/// does not match the tab it currently intends to view, so a sync built
/// for a prior binding that arrives after a fast switch sequence is
/// harmless.
pub fn build_sync(handle: &SessionHandle) -> ServerMessage {
    let runtime = handle.runtime();
    ServerMessage::StateSync {
        tab_id: handle.id(),
        messages: runtime.current_messages(),
        streaming: runtime.is_streaming(),
        model_id: runtime.model_id(),
        session_id: runtime.session_id(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::mock::MockRuntime;
    use atrium_protocol::{ContentSegment, TranscriptEntry};
    use std::sync::Arc;
    use uuid::Uuid;

    fn handle_with_history() -> (SessionHandle, Arc<MockRuntime>) {
        let (runtime, _events) = MockRuntime::spawn_pair();
        runtime.set_model_id("sonnet");
        runtime.set_session_id("abc123");
        runtime.push_message(TranscriptEntry::User { text: "hi".into() });
        runtime.push_message(TranscriptEntry::Assistant {
            segments: vec![
                ContentSegment::Thinking {
                    text: "hm".into(),
                },
                ContentSegment::Text {
                    text: "hello".into(),
                },
            ],
        });
        let handle = SessionHandle::new(Uuid::new_v4(), "test", Arc::clone(&runtime) as _, 1);
        (handle, runtime)
    }

    #[test]
    fn test_sync_reflects_runtime_state() {
        let (handle, runtime) = handle_with_history();
        runtime.set_streaming(true);

        match build_sync(&handle) {
            ServerMessage::StateSync {
                tab_id,
                messages,
                streaming,
                model_id,
                session_id,
            } => {
                assert_eq!(tab_id, handle.id());
                assert_eq!(messages.len(), 2);
                assert!(streaming);
                assert_eq!(model_id.as_deref(), Some("sonnet"));
                assert_eq!(session_id.as_deref(), Some("abc123"));
            }
            other => panic!("Expected StateSync, got {:?}", other),
        }
    }

    #[test]
    fn test_sync_is_idempotent() {
        let (handle, _runtime) = handle_with_history();

        let first = build_sync(&handle);
        let second = build_sync(&handle);

        // Equal down to the encoded bytes
        assert_eq!(first, second);
        assert_eq!(
            bincode::serialize(&first).unwrap(),
            bincode::serialize(&second).unwrap()
        );
    }

    #[test]
    fn test_sync_changes_with_runtime_activity() {
        let (handle, runtime) = handle_with_history();

        let before = build_sync(&handle);
        runtime.push_message(TranscriptEntry::User {
            text: "more".into(),
        });
        let after = build_sync(&handle);

        assert_ne!(before, after);
    }
}
