//! Login / register form.

use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Login,
    Register,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Username,
    Password,
}

/// What a key press asks the app to do.
#[derive(Debug, PartialEq, Eq)]
pub enum LoginAction {
    None,
    Submit {
        mode: AuthMode,
        username: String,
        password: String,
    },
    Quit,
}

#[derive(Debug)]
pub struct LoginForm {
    pub mode: AuthMode,
    pub focus: Field,
    pub username: String,
    pub password: String,
    /// Red line under the form.
    pub error: Option<String>,
    /// Neutral line under the form (e.g. after registering).
    pub notice: Option<String>,
    pub busy: bool,
}

impl Default for LoginForm {
    fn default() -> Self {
        Self {
            mode: AuthMode::Login,
            focus: Field::Username,
            username: String::new(),
            password: String::new(),
            error: None,
            notice: None,
            busy: false,
        }
    }
}

impl LoginForm {
    pub fn with_notice(notice: impl Into<String>) -> Self {
        Self {
            notice: Some(notice.into()),
            ..Default::default()
        }
    }

    pub fn title(&self) -> &'static str {
        match self.mode {
            AuthMode::Login => "Welcome Back",
            AuthMode::Register => "Create Account",
        }
    }

    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            AuthMode::Login => AuthMode::Register,
            AuthMode::Register => AuthMode::Login,
        };
        self.error = None;
        self.notice = None;
    }

    fn field_mut(&mut self) -> &mut String {
        match self.focus {
            Field::Username => &mut self.username,
            Field::Password => &mut self.password,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> LoginAction {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c') => LoginAction::Quit,
                KeyCode::Char('r') => {
                    self.toggle_mode();
                    LoginAction::None
                }
                _ => LoginAction::None,
            };
        }

        match key.code {
            KeyCode::Esc => LoginAction::Quit,
            KeyCode::Tab | KeyCode::Down | KeyCode::Up | KeyCode::BackTab => {
                self.focus = match self.focus {
                    Field::Username => Field::Password,
                    Field::Password => Field::Username,
                };
                LoginAction::None
            }
            KeyCode::Enter => {
                if self.busy {
                    return LoginAction::None;
                }
                if self.focus == Field::Username && self.password.is_empty() {
                    self.focus = Field::Password;
                    return LoginAction::None;
                }
                self.error = None;
                self.busy = true;
                LoginAction::Submit {
                    mode: self.mode,
                    username: self.username.clone(),
                    password: self.password.clone(),
                }
            }
            KeyCode::Backspace => {
                self.field_mut().pop();
                LoginAction::None
            }
            KeyCode::Char(c) => {
                self.field_mut().push(c);
                LoginAction::None
            }
            _ => LoginAction::None,
        }
    }

    /// Registration succeeded: back to login with the username kept.
    pub fn registered(&mut self, notice: &str) {
        self.busy = false;
        self.mode = AuthMode::Login;
        self.password.clear();
        self.focus = Field::Password;
        self.error = None;
        self.notice = Some(notice.to_string());
    }

    pub fn failed(&mut self, message: String) {
        self.busy = false;
        self.notice = None;
        self.error = Some(message);
    }
}
