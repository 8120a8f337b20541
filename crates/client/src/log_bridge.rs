//! Bridge for forwarding human-readable tunnel progress lines to the caller
//!
//! The engine's only caller-visible output besides its sockets: connect,
//! disconnect/retry, oversize-drop and stop notices are posted as plain
//! strings to an optional listener installed by the embedding application.

use std::sync::{Arc, Mutex};

/// Posts log lines to a caller-installed listener, if one is set.
#[derive(Clone, Default)]
pub struct LogBridge {
    listener: Option<Arc<Mutex<dyn FnMut(&str) + Send + Sync + 'static>>>,
}

impl LogBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a listener that will receive every progress line.
    pub fn set_listener(&mut self, listener: impl FnMut(&str) + Send + Sync + 'static) {
        self.listener = Some(Arc::new(Mutex::new(listener)));
    }

    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    /// Post a line to the listener (no-op when none is installed).
    pub fn post(&self, line: &str) {
        if let Some(ref listener) = self.listener {
            listener.lock().unwrap()(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_without_listener_is_noop() {
        let bridge = LogBridge::new();
        assert!(!bridge.has_listener());
        bridge.post("dropped on the floor");
    }

    #[test]
    fn test_listener_receives_lines() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();

        let mut bridge = LogBridge::new();
        bridge.set_listener(move |line| sink.lock().unwrap().push(line.to_string()));
        assert!(bridge.has_listener());

        bridge.post("connected");
        bridge.post("disconnected");
        assert_eq!(
            *lines.lock().unwrap(),
            vec!["connected".to_string(), "disconnected".to_string()]
        );
    }
}
