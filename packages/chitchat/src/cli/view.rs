//! Rendering. Nothing here mutates state except list highlight positions.

use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Padding, Paragraph, Wrap},
};

use chitchat_core::ChatTab;

use super::app::{App, ChatScreen, Focus, Modal, Screen};
use super::login::{Field, LoginForm};
use super::picker::NewChatPicker;
use crate::push::ChannelState;

/// Rows to skip so the last `total` lines end at the bottom of `height`.
/// Saturates at `u16::MAX`, the most a `Paragraph` can scroll.
fn scroll_offset(total: usize, height: usize) -> u16 {
    u16::try_from(total.saturating_sub(height)).unwrap_or(u16::MAX)
}

/// Local wall-clock `HH:MM` for a timestamp in seconds.
pub fn clock_time(ts: f64) -> String {
    let secs = ts.floor() as i64;
    let nanos = ((ts - ts.floor()) * 1e9) as u32;
    chrono::DateTime::from_timestamp(secs, nanos)
        .map(|dt| dt.with_timezone(&chrono::Local).format("%H:%M").to_string())
        .unwrap_or_default()
}

pub fn draw(frame: &mut Frame, app: &mut App) {
    match &mut app.screen {
        Screen::Login(form) => draw_login(frame, form),
        Screen::Chat(chat) => draw_chat(frame, chat),
    }
}

fn dim() -> Style {
    Style::default().add_modifier(Modifier::DIM)
}

fn bold() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(area.width);
    let h = height.min(area.height);
    Rect {
        x: area.x + (area.width - w) / 2,
        y: area.y + (area.height - h) / 2,
        width: w,
        height: h,
    }
}

// ── login ───────────────────────────────────────────────────────────────

fn draw_login(frame: &mut Frame, form: &LoginForm) {
    let area = centered(frame.area(), 50, 12);

    let field = |label: &str, value: String, focused: bool| {
        let marker = if focused { "▸ " } else { "  " };
        let style = if focused { bold() } else { Style::default() };
        Line::from(vec![
            Span::raw(marker),
            Span::styled(format!("{label:<10}"), dim()),
            Span::styled(value, style),
        ])
    };

    let mut lines = vec![
        Line::raw(""),
        field(
            "Username",
            form.username.clone(),
            form.focus == Field::Username,
        ),
        field(
            "Password",
            "•".repeat(form.password.chars().count()),
            form.focus == Field::Password,
        ),
        Line::raw(""),
    ];
    if form.busy {
        lines.push(Line::styled("  Please wait…", dim()));
    }
    if let Some(err) = &form.error {
        lines.push(Line::styled(format!("  {err}"), Style::default().fg(Color::Red)));
    }
    if let Some(notice) = &form.notice {
        lines.push(Line::styled(
            format!("  {notice}"),
            Style::default().fg(Color::Green),
        ));
    }

    let block = Block::default()
        .title(format!(" chitchat: {} ", form.title()))
        .title_bottom(Line::raw(
            " enter submit · tab switch field · ctrl-r login/register · esc quit ",
        ))
        .borders(Borders::ALL)
        .padding(Padding::horizontal(1));
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

// ── chat ────────────────────────────────────────────────────────────────

fn draw_chat(frame: &mut Frame, chat: &mut ChatScreen) {
    let [left, right] =
        Layout::horizontal([Constraint::Percentage(32), Constraint::Percentage(68)])
            .areas(frame.area());

    draw_sidebar(frame, chat, left);
    draw_thread(frame, chat, right);

    match &mut chat.modal {
        Some(Modal::NewChat(picker)) => draw_picker(frame, picker),
        Some(Modal::ConfirmDelete { name, .. }) => draw_confirm(frame, name),
        None => {}
    }
}

fn draw_sidebar(frame: &mut Frame, chat: &mut ChatScreen, area: Rect) {
    let [tabs_area, search_area, list_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Min(1),
    ])
    .areas(
        Block::default()
            .borders(Borders::ALL)
            .inner(area),
    );

    let hints = match chat.focus {
        Focus::List => " ↑↓ · enter open · n new · d delete · t tab · / search · L logout · q quit ",
        Focus::Search => " type to search · enter/esc done ",
        Focus::Composer => " tab list ",
    };
    let outer = Block::default()
        .title(format!(" chitchat · {} ", chat.state.username()))
        .title_bottom(Line::styled(hints, dim()))
        .borders(Borders::ALL);
    frame.render_widget(outer, area);

    let tab_spans: Vec<Span> = [ChatTab::All, ChatTab::Private, ChatTab::Group]
        .into_iter()
        .flat_map(|t| {
            let style = if t == chat.tab {
                bold().add_modifier(Modifier::REVERSED)
            } else {
                dim()
            };
            [Span::styled(format!(" {} ", t.title()), style), Span::raw(" ")]
        })
        .collect();
    frame.render_widget(Paragraph::new(Line::from(tab_spans)), tabs_area);

    let search_style = if chat.focus == Focus::Search {
        bold()
    } else {
        dim()
    };
    frame.render_widget(
        Paragraph::new(Line::styled(format!(" / {}", chat.search), search_style)),
        search_area,
    );

    let active_id = chat.state.active_id().map(str::to_string);
    let items: Vec<ListItem> = chat
        .visible()
        .into_iter()
        .map(|c| {
            let name = chat.state.display_name(c);
            let marker = if active_id.as_deref() == Some(c.id.as_str()) {
                "● "
            } else {
                "  "
            };
            ListItem::new(vec![
                Line::from(vec![Span::raw(marker), Span::styled(name, bold())]),
                Line::styled(format!("  {}", c.activity_label()), dim()),
            ])
        })
        .collect();

    if items.is_empty() {
        frame.render_widget(
            Paragraph::new(Line::styled("No chats found.", dim())).alignment(Alignment::Center),
            list_area,
        );
        return;
    }

    let list = List::new(items)
        .highlight_style(Style::default().add_modifier(Modifier::BOLD | Modifier::REVERSED))
        .highlight_symbol("▸ ");
    frame.render_stateful_widget(list, list_area, &mut chat.list_state);
}

fn draw_thread(frame: &mut Frame, chat: &ChatScreen, area: Rect) {
    let [thread_area, input_area] =
        Layout::vertical([Constraint::Min(3), Constraint::Length(3)]).areas(area);

    let channel = chat.push.state();
    let channel_style = match channel {
        ChannelState::Open => Style::default().fg(Color::Green),
        ChannelState::Connecting => Style::default().fg(Color::Yellow),
        ChannelState::Closed => Style::default().fg(Color::Red),
    };

    let Some(active) = chat.state.active() else {
        let block = Block::default()
            .title_top(Line::styled(format!(" {} ", channel.label()), channel_style).alignment(Alignment::Right))
            .borders(Borders::ALL);
        frame.render_widget(
            Paragraph::new(vec![
                Line::raw(""),
                Line::styled("Select a chat to start messaging", dim()),
            ])
            .alignment(Alignment::Center)
            .block(block),
            area,
        );
        return;
    };

    let mut lines: Vec<Line> = Vec::new();
    for m in chat.state.messages() {
        lines.push(Line::from(vec![
            Span::styled(chat.state.sender_label(&m.sender_id), bold()),
            Span::styled(format!("  {}", clock_time(m.timestamp)), dim()),
        ]));
        lines.push(Line::raw(format!("  {}", m.text)));
    }
    for p in chat.state.pending_for_active() {
        lines.push(Line::styled("Me  sending…", dim()));
        lines.push(Line::styled(format!("  {}", p.text), dim()));
    }

    // Keep the newest lines in view
    let inner_height = thread_area.height.saturating_sub(2) as usize;
    let scroll = scroll_offset(lines.len(), inner_height);

    let mut block = Block::default()
        .title(format!(" {} ", chat.state.display_name(active)))
        .title_top(Line::styled(format!(" {} ", channel.label()), channel_style).alignment(Alignment::Right))
        .borders(Borders::ALL)
        .padding(Padding::horizontal(1));
    if let Some(status) = &chat.status {
        block = block.title_bottom(Line::styled(format!(" {status} "), Style::default().fg(Color::Yellow)));
    }
    frame.render_widget(
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .scroll((scroll, 0))
            .block(block),
        thread_area,
    );

    let input_style = if chat.focus == Focus::Composer {
        bold()
    } else {
        dim()
    };
    let input = Paragraph::new(Line::styled(format!("{}▏", chat.composer.input()), input_style)).block(
        Block::default()
            .title(" Type a message… ")
            .borders(Borders::ALL),
    );
    frame.render_widget(input, input_area);
}

fn draw_picker(frame: &mut Frame, picker: &mut NewChatPicker) {
    let area = centered(frame.area(), 44, 16);
    frame.render_widget(Clear, area);

    let block = Block::default()
        .title(format!(" {} ", picker.title()))
        .title_bottom(Line::styled(
            " space select · tab group name · enter create · esc cancel ",
            dim(),
        ))
        .borders(Borders::ALL)
        .padding(Padding::horizontal(1));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [list_area, name_area, error_area] = Layout::vertical([
        Constraint::Min(1),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(inner);

    if picker.users().is_empty() {
        frame.render_widget(
            Paragraph::new(Line::styled("No other users found.", dim())),
            list_area,
        );
    } else {
        let items: Vec<ListItem> = picker
            .users()
            .iter()
            .map(|u| {
                let check = if picker.is_selected(&u.id) { "[x] " } else { "[ ] " };
                ListItem::new(Line::raw(format!("{check}{}", u.username)))
            })
            .collect();
        let list = List::new(items)
            .highlight_style(Style::default().add_modifier(Modifier::BOLD | Modifier::REVERSED));
        frame.render_stateful_widget(list, list_area, &mut picker.list_state);
    }

    if picker.wants_group_name() {
        let style = if picker.editing_name { bold() } else { dim() };
        frame.render_widget(
            Paragraph::new(Line::styled(format!("Group name: {}", picker.group_name), style)),
            name_area,
        );
    }
    if let Some(err) = &picker.error {
        frame.render_widget(
            Paragraph::new(Line::styled(err.clone(), Style::default().fg(Color::Red))),
            error_area,
        );
    } else if picker.busy {
        frame.render_widget(Paragraph::new(Line::styled("Creating…", dim())), error_area);
    }
}

fn draw_confirm(frame: &mut Frame, name: &str) {
    let area = centered(frame.area(), 48, 5);
    frame.render_widget(Clear, area);
    let block = Block::default()
        .title(" Delete chat ")
        .borders(Borders::ALL)
        .padding(Padding::horizontal(1));
    let text = vec![
        Line::raw(format!("Delete \"{name}\"? This cannot be undone.")),
        Line::from(vec![
            Span::styled("y", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
            Span::raw(" to confirm · any key to cancel"),
        ]),
    ];
    frame.render_widget(Paragraph::new(text).block(block), area);
}
