use std::sync::Arc;

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use agent_beacon::registry::SessionView;
use agent_beacon::status::SessionStatus;

use crate::actions::Action;

/// Theme colors inspired by Claude Code
pub struct Theme {
    pub fg: Color,
    pub accent: Color,
    pub dim: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            fg: Color::Rgb(220, 220, 220),
            accent: Color::Rgb(217, 119, 87), // Claude orange
            dim: Color::Rgb(100, 100, 100),
            success: Color::Rgb(80, 200, 120),
            warning: Color::Rgb(255, 193, 7),
            error: Color::Rgb(220, 53, 69),
        }
    }
}

impl Theme {
    fn status(&self, status: SessionStatus) -> (&'static str, Color) {
        match status {
            SessionStatus::NeedsAttention => ("! ", self.accent),
            SessionStatus::Working => ("● ", self.warning),
            SessionStatus::Ready => ("● ", self.success),
            SessionStatus::Disconnected => ("○ ", self.dim),
        }
    }
}

/// Footer message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub is_error: bool,
}

/// Main application state
pub struct App {
    /// Latest list published by the registry
    pub sessions: Arc<Vec<SessionView>>,
    /// Currently selected session index
    pub list_state: ListState,
    /// Current message to display (info or error)
    pub notice: Option<Notice>,
    /// Theme
    pub theme: Theme,
    /// Pending action queue
    pub pending_actions: Vec<Action>,
}

impl App {
    pub fn new() -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));

        Self {
            sessions: Arc::new(Vec::new()),
            list_state,
            notice: None,
            theme: Theme::default(),
            pending_actions: Vec::new(),
        }
    }

    /// Get the currently selected session
    pub fn selected_session(&self) -> Option<&SessionView> {
        self.list_state
            .selected()
            .and_then(|i| self.sessions.get(i))
    }

    /// Take pending actions (drains the queue)
    pub fn take_pending_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.pending_actions)
    }

    /// Handle an action and return whether to quit
    pub fn handle_action(&mut self, action: Action) -> Result<bool> {
        match action {
            Action::KeyPress(key) => self.handle_key(key),
            Action::SessionsUpdated(sessions) => {
                self.replace_sessions(sessions);
                Ok(false)
            }
            Action::Notice(text) => {
                self.notice = Some(Notice {
                    text,
                    is_error: false,
                });
                Ok(false)
            }
            Action::Error(text) => {
                self.notice = Some(Notice {
                    text,
                    is_error: true,
                });
                Ok(false)
            }
            Action::Quit => Ok(true),
            _ => Ok(false),
        }
    }

    /// Swap in a new list, keeping the selection on the same session when it
    /// is still present.
    fn replace_sessions(&mut self, sessions: Arc<Vec<SessionView>>) {
        let selected_id = self.selected_session().map(|s| s.id.clone());
        self.sessions = sessions;

        let index = selected_id
            .and_then(|id| self.sessions.iter().position(|s| s.id == id))
            .or_else(|| {
                self.list_state
                    .selected()
                    .map(|i| i.min(self.sessions.len().saturating_sub(1)))
            });
        self.list_state.select(index.or(Some(0)));
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        // Clear message on any key press
        self.notice = None;

        match key.code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Ok(true);
            }
            KeyCode::Char('j') | KeyCode::Down => self.next_session(),
            KeyCode::Char('k') | KeyCode::Up => self.previous_session(),
            KeyCode::Enter => {
                if let Some(id) = self.selected_session().map(|s| s.id.clone()) {
                    self.pending_actions.push(Action::FocusSession(id));
                }
            }
            KeyCode::Char('r') => self.pending_actions.push(Action::Refresh),
            KeyCode::Char('y') => {
                let path = self
                    .selected_session()
                    .map(|s| s.heartbeat.cwd.clone())
                    .filter(|cwd| !cwd.is_empty());
                if let Some(path) = path {
                    self.pending_actions.push(Action::CopyPath(path));
                }
            }
            _ => {}
        }
        Ok(false)
    }

    fn next_session(&mut self) {
        if self.sessions.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(i) if i + 1 < self.sessions.len() => i + 1,
            _ => 0,
        };
        self.list_state.select(Some(i));
    }

    fn previous_session(&mut self) {
        if self.sessions.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(0) | None => self.sessions.len() - 1,
            Some(i) => i - 1,
        };
        self.list_state.select(Some(i));
    }

    pub fn render(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Min(0),    // Main content
                Constraint::Length(3), // Footer/status
            ])
            .split(frame.area());

        self.render_header(frame, chunks[0]);
        self.render_main(frame, chunks[1]);
        self.render_footer(frame, chunks[2]);
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let attention = self
            .sessions
            .iter()
            .filter(|s| s.status == SessionStatus::NeedsAttention)
            .count();
        let working = self
            .sessions
            .iter()
            .filter(|s| s.status == SessionStatus::Working)
            .count();

        let title = Paragraph::new(Line::from(vec![
            Span::styled(
                " Agent Beacon ",
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!(
                    "│ {} sessions · {} need attention · {} working",
                    self.sessions.len(),
                    attention,
                    working
                ),
                Style::default().fg(self.theme.dim),
            ),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(title, area);
    }

    fn render_main(&mut self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(45), // Session list
                Constraint::Percentage(55), // Detail pane
            ])
            .split(area);

        self.render_session_list(frame, chunks[0]);
        self.render_detail_pane(frame, chunks[1]);
    }

    fn render_session_list(&mut self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = if self.sessions.is_empty() {
            vec![ListItem::new(Line::from(Span::styled(
                "  No sessions yet. Start an agent with the beacon hooks installed.",
                Style::default().fg(self.theme.dim),
            )))]
        } else {
            self.sessions
                .iter()
                .map(|session| {
                    let (icon, color) = self.theme.status(session.status);
                    ListItem::new(Line::from(vec![
                        Span::styled(icon, Style::default().fg(color)),
                        Span::styled(
                            session.display_name().to_string(),
                            Style::default().fg(self.theme.fg),
                        ),
                        Span::styled(
                            format!("  {}", session.last_seen_label()),
                            Style::default().fg(self.theme.dim),
                        ),
                    ]))
                })
                .collect()
        };

        let list = List::new(items)
            .block(
                Block::default()
                    .title(" Sessions ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(self.theme.dim)),
            )
            .highlight_style(
                Style::default()
                    .bg(Color::Rgb(50, 50, 50))
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("▶ ");

        frame.render_stateful_widget(list, area, &mut self.list_state);
    }

    fn detail_line(&self, label: &'static str, value: String) -> Line<'static> {
        Line::from(vec![
            Span::styled(label, Style::default().fg(self.theme.dim)),
            Span::styled(value, Style::default().fg(self.theme.fg)),
        ])
    }

    fn render_detail_pane(&self, frame: &mut Frame, area: Rect) {
        let content = if let Some(session) = self.selected_session() {
            let (_, color) = self.theme.status(session.status);
            let mut lines = vec![
                self.detail_line("Name: ", session.display_name().to_string()),
                self.detail_line("ID: ", session.id.clone()),
                Line::from(vec![
                    Span::styled("Status: ", Style::default().fg(self.theme.dim)),
                    Span::styled(session.status.label(), Style::default().fg(color)),
                ]),
                self.detail_line("Path: ", session.heartbeat.cwd.clone()),
                self.detail_line("Last seen: ", session.last_seen_label()),
            ];
            if !session.heartbeat.model.is_empty() {
                lines.push(self.detail_line("Model: ", session.heartbeat.model.clone()));
            }
            if let Some(vcs) = session.vcs_label() {
                lines.push(self.detail_line("Branch: ", vcs));
            }
            if let Some(context) = session.context_label() {
                lines.push(self.detail_line("Context: ", context));
            }
            lines.push(self.detail_line("Cost: ", session.cost_label()));
            if let Some(activity) = session.context() {
                lines.push(self.detail_line("Doing: ", activity.to_string()));
            }
            if let Some(message) = session.last_message() {
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled(
                    message.to_string(),
                    Style::default().fg(self.theme.fg),
                )));
            }
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                "Press Enter to focus, 'y' to copy path",
                Style::default().fg(self.theme.dim),
            )));
            lines
        } else {
            vec![Line::from(Span::styled(
                "No session selected",
                Style::default().fg(self.theme.dim),
            ))]
        };

        let detail = Paragraph::new(content)
            .wrap(Wrap { trim: false })
            .block(
                Block::default()
                    .title(" Details ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(self.theme.dim)),
            );
        frame.render_widget(detail, area);
    }

    fn render_footer(&self, frame: &mut Frame, area: Rect) {
        let help_text = " q: Quit │ j/k: Navigate │ Enter: Focus │ r: Refresh │ y: Copy path ";

        let content = if let Some(ref notice) = self.notice {
            let color = if notice.is_error {
                self.theme.error
            } else {
                self.theme.success
            };
            Line::from(Span::styled(
                format!(" {} ", notice.text),
                Style::default().fg(color),
            ))
        } else {
            Line::from(Span::styled(help_text, Style::default().fg(self.theme.dim)))
        };

        let footer = Paragraph::new(content).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(footer, area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_beacon::records::Heartbeat;
    use std::time::Duration;

    fn view(id: &str) -> SessionView {
        SessionView {
            id: id.to_string(),
            heartbeat: Heartbeat {
                session_id: id.to_string(),
                cwd: format!("/work/{id}"),
                last_updated: 1.0,
                ..Heartbeat::default()
            },
            lifecycle: None,
            status: SessionStatus::Ready,
            process_alive: true,
            last_seen_age: Duration::from_secs(1),
        }
    }

    fn key(code: KeyCode) -> Action {
        Action::KeyPress(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn app_with(ids: &[&str]) -> App {
        let mut app = App::new();
        let sessions = ids.iter().map(|id| view(id)).collect();
        app.handle_action(Action::SessionsUpdated(Arc::new(sessions)))
            .unwrap();
        app
    }

    #[test]
    fn test_navigation_wraps() {
        let mut app = app_with(&["a", "b"]);
        app.handle_action(key(KeyCode::Char('k'))).unwrap();
        assert_eq!(app.selected_session().unwrap().id, "b");
        app.handle_action(key(KeyCode::Char('j'))).unwrap();
        assert_eq!(app.selected_session().unwrap().id, "a");
    }

    #[test]
    fn test_selection_follows_session_across_updates() {
        let mut app = app_with(&["a", "b", "c"]);
        app.handle_action(key(KeyCode::Down)).unwrap();
        assert_eq!(app.selected_session().unwrap().id, "b");

        let reordered = vec![view("c"), view("b"), view("a")];
        app.handle_action(Action::SessionsUpdated(Arc::new(reordered)))
            .unwrap();
        assert_eq!(app.selected_session().unwrap().id, "b");

        app.handle_action(Action::SessionsUpdated(Arc::new(vec![view("a")])))
            .unwrap();
        assert_eq!(app.selected_session().unwrap().id, "a");
    }

    #[test]
    fn test_keys_queue_actions() {
        let mut app = app_with(&["a"]);
        for code in [KeyCode::Enter, KeyCode::Char('r'), KeyCode::Char('y')] {
            app.handle_action(key(code)).unwrap();
        }
        let actions = app.take_pending_actions();
        assert!(matches!(&actions[0], Action::FocusSession(id) if id == "a"));
        assert!(matches!(&actions[1], Action::Refresh));
        assert!(matches!(&actions[2], Action::CopyPath(path) if path == "/work/a"));
        assert!(app.take_pending_actions().is_empty());
    }

    #[test]
    fn test_quit_and_notice_cleared() {
        let mut app = app_with(&[]);
        app.handle_action(Action::Error("boom".into())).unwrap();
        assert!(app.notice.as_ref().unwrap().is_error);
        assert!(!app.handle_action(key(KeyCode::Char('j'))).unwrap());
        assert!(app.notice.is_none());
        assert!(app.handle_action(key(KeyCode::Char('q'))).unwrap());
    }
}
