//! New-chat picker: choose users, and a group name once more than one is
//! chosen.

use ratatui::crossterm::event::{KeyCode, KeyEvent};
use ratatui::widgets::ListState;

use chitchat_core::{Directory, NewConversation, User};

#[derive(Debug, PartialEq, Eq)]
pub enum PickerAction {
    None,
    Submit {
        selected: Vec<String>,
        group_name: String,
    },
    Cancel,
}

pub struct NewChatPicker {
    me: String,
    users: Vec<User>,
    selected: Vec<String>,
    pub list_state: ListState,
    pub group_name: String,
    pub editing_name: bool,
    pub error: Option<String>,
    pub busy: bool,
}

impl NewChatPicker {
    pub fn new(directory: &Directory, me: &str) -> Self {
        let users: Vec<User> = directory.others(me).cloned().collect();
        let list_state = ListState::default().with_selected((!users.is_empty()).then_some(0));
        Self {
            me: me.to_string(),
            users,
            selected: Vec::new(),
            list_state,
            group_name: String::new(),
            editing_name: false,
            error: None,
            busy: false,
        }
    }

    /// Replace the user list, keeping selections that still exist.
    pub fn refresh_users(&mut self, directory: &Directory) {
        self.users = directory.others(&self.me).cloned().collect();
        let users = &self.users;
        self.selected.retain(|id| users.iter().any(|u| &u.id == id));
        let max = self.users.len().saturating_sub(1);
        let sel = self.list_state.selected().unwrap_or(0).min(max);
        self.list_state
            .select((!self.users.is_empty()).then_some(sel));
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn is_selected(&self, user_id: &str) -> bool {
        self.selected.iter().any(|s| s == user_id)
    }

    pub fn wants_group_name(&self) -> bool {
        self.selected.len() > 1
    }

    pub fn title(&self) -> &'static str {
        if self.wants_group_name() {
            "Create Group"
        } else {
            "Select Users"
        }
    }

    fn toggle_highlighted(&mut self) {
        let Some(user) = self.list_state.selected().and_then(|i| self.users.get(i)) else {
            return;
        };
        let id = user.id.clone();
        if let Some(pos) = self.selected.iter().position(|s| *s == id) {
            self.selected.remove(pos);
        } else {
            self.selected.push(id);
        }
        if !self.wants_group_name() {
            self.editing_name = false;
        }
        self.error = None;
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> PickerAction {
        if self.busy {
            return match key.code {
                KeyCode::Esc => PickerAction::Cancel,
                _ => PickerAction::None,
            };
        }

        if self.editing_name {
            match key.code {
                KeyCode::Esc | KeyCode::Tab => self.editing_name = false,
                KeyCode::Enter => return self.submit(),
                KeyCode::Backspace => {
                    self.group_name.pop();
                }
                KeyCode::Char(c) => self.group_name.push(c),
                _ => {}
            }
            return PickerAction::None;
        }

        let total = self.users.len();
        match key.code {
            KeyCode::Esc => return PickerAction::Cancel,
            KeyCode::Down | KeyCode::Char('j') if total > 0 => {
                let i = self.list_state.selected().unwrap_or(0);
                self.list_state.select(Some((i + 1) % total));
            }
            KeyCode::Up | KeyCode::Char('k') if total > 0 => {
                let i = self.list_state.selected().unwrap_or(0);
                self.list_state
                    .select(Some(if i == 0 { total - 1 } else { i - 1 }));
            }
            KeyCode::Char(' ') => self.toggle_highlighted(),
            KeyCode::Tab if self.wants_group_name() => self.editing_name = true,
            KeyCode::Enter => return self.submit(),
            _ => {}
        }
        PickerAction::None
    }

    fn submit(&mut self) -> PickerAction {
        if let Err(e) = NewConversation::validate(&self.me, &self.selected, &self.group_name) {
            self.error = Some(e.to_string());
            return PickerAction::None;
        }
        self.error = None;
        self.busy = true;
        PickerAction::Submit {
            selected: self.selected.clone(),
            group_name: self.group_name.clone(),
        }
    }

    /// Creation failed server-side; let the user retry.
    pub fn failed(&mut self, message: impl Into<String>) {
        self.busy = false;
        self.error = Some(message.into());
    }
}
