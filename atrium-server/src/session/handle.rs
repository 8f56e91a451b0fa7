//! A single tab: identity plus its agent runtime

use std::sync::Arc;
use uuid::Uuid;

use atrium_protocol::{StreamingBehavior, TabInfo};
use atrium_utils::Result;

use crate::runtime::AgentRuntime;

/// One independently addressable agent session
///
/// Owns the runtime instance for its tab. Exactly one handle exists per tab
/// identifier; disposing it releases the runtime's resources.
pub struct SessionHandle {
    /// Unique tab identifier
    id: Uuid,
    /// Display name shown in viewer tab bars
    name: String,
    /// The agent runtime driving this tab's conversation
    runtime: Arc<dyn AgentRuntime>,
    /// Position in creation order (also feeds "Session N" default names)
    created_order: u64,
}

impl SessionHandle {
    /// Create a new session handle
    pub fn new(
        id: Uuid,
        name: impl Into<String>,
        runtime: Arc<dyn AgentRuntime>,
        created_order: u64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            runtime,
            created_order,
        }
    }

    /// Get the tab ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get the display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the creation ordinal
    pub fn created_order(&self) -> u64 {
        self.created_order
    }

    /// Get the underlying runtime
    pub fn runtime(&self) -> &Arc<dyn AgentRuntime> {
        &self.runtime
    }

    /// Protocol-facing summary of this tab
    pub fn info(&self) -> TabInfo {
        TabInfo {
            id: self.id,
            name: self.name.clone(),
        }
    }

    /// Submit a prompt, applying the caller-chosen streaming behavior
    ///
    /// If a response is mid-flight, `Interrupt` aborts it first; `FollowUp`
    /// relies on the runtime's own queueing. Never waits for the response:
    /// progress arrives through the runtime's event stream.
    pub fn submit(&self, text: &str, behavior: StreamingBehavior) -> Result<()> {
        if behavior == StreamingBehavior::Interrupt && self.runtime.is_streaming() {
            self.runtime.abort();
        }
        self.runtime.submit(text)
    }

    /// Signal the runtime to stop its in-flight response; idempotent
    pub fn abort(&self) {
        self.runtime.abort();
    }

    /// Release the runtime's resources
    pub fn dispose(&self) {
        self.runtime.dispose();
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("created_order", &self.created_order)
            .field("streaming", &self.runtime.is_streaming())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::mock::MockRuntime;

    fn handle_with_mock() -> (SessionHandle, Arc<MockRuntime>) {
        let (runtime, _events) = MockRuntime::spawn_pair();
        let handle = SessionHandle::new(Uuid::new_v4(), "test", Arc::clone(&runtime) as _, 1);
        (handle, runtime)
    }

    #[test]
    fn test_info() {
        let (handle, _runtime) = handle_with_mock();
        let info = handle.info();
        assert_eq!(info.id, handle.id());
        assert_eq!(info.name, "test");
    }

    #[test]
    fn test_submit_follow_up_does_not_abort() {
        let (handle, runtime) = handle_with_mock();
        runtime.set_streaming(true);

        handle.submit("next", StreamingBehavior::FollowUp).unwrap();

        assert_eq!(runtime.abort_count(), 0);
        assert_eq!(runtime.submitted(), vec!["next".to_string()]);
    }

    #[test]
    fn test_submit_interrupt_aborts_in_flight_response() {
        let (handle, runtime) = handle_with_mock();
        runtime.set_streaming(true);

        handle.submit("redirect", StreamingBehavior::Interrupt).unwrap();

        assert_eq!(runtime.abort_count(), 1);
        assert_eq!(runtime.submitted(), vec!["redirect".to_string()]);
    }

    #[test]
    fn test_submit_interrupt_idle_does_not_abort() {
        let (handle, runtime) = handle_with_mock();

        handle.submit("hi", StreamingBehavior::Interrupt).unwrap();

        assert_eq!(runtime.abort_count(), 0);
    }

    #[test]
    fn test_dispose_releases_runtime() {
        let (handle, runtime) = handle_with_mock();
        handle.dispose();
        assert!(runtime.disposed());
    }
}
