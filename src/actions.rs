use std::sync::Arc;

use crossterm::event::KeyEvent;

use agent_beacon::registry::SessionView;

/// Actions that can be dispatched through the application
#[derive(Debug, Clone)]
pub enum Action {
    /// A key was pressed
    KeyPress(KeyEvent),
    /// The registry published a new session list
    SessionsUpdated(Arc<Vec<SessionView>>),
    /// Show a transient message in the footer
    Notice(String),
    /// An error occurred
    Error(String),
    /// Request to quit the application
    Quit,
    /// Bring a session's pane to the foreground
    FocusSession(String),
    /// Rescan now and recheck process liveness
    Refresh,
    /// Copy a working directory to the clipboard
    CopyPath(String),
}
