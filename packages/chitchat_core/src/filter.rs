//! Conversation list tabs and search.

use serde::{Deserialize, Serialize};

use crate::models::Conversation;

/// Which slice of the conversation list is shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatTab {
    #[default]
    All,
    Private,
    Group,
}

impl ChatTab {
    pub fn admits(self, conv: &Conversation) -> bool {
        match self {
            Self::All => true,
            Self::Private => !conv.is_group,
            Self::Group => conv.is_group,
        }
    }

    pub fn next(self) -> Self {
        match self {
            Self::All => Self::Private,
            Self::Private => Self::Group,
            Self::Group => Self::All,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::All => "All",
            Self::Private => "Private",
            Self::Group => "Groups",
        }
    }
}

/// Name used for search matching. Falls back to the group name, then "Chat".
pub fn search_name(display_name: &str, conv: &Conversation) -> String {
    if !display_name.is_empty() {
        return display_name.to_string();
    }
    match conv.group_name.as_deref() {
        Some(g) if !g.is_empty() => g.to_string(),
        _ => "Chat".to_string(),
    }
}

/// Apply the tab filter, then a case-insensitive substring search on the
/// display name. An empty search term matches everything. Order is kept.
pub fn filter_conversations<'a, F>(
    conversations: &'a [Conversation],
    tab: ChatTab,
    search: &str,
    display_name: F,
) -> Vec<&'a Conversation>
where
    F: Fn(&Conversation) -> String,
{
    let needle = search.to_lowercase();
    conversations
        .iter()
        .filter(|c| tab.admits(c))
        .filter(|c| {
            if needle.is_empty() {
                return true;
            }
            search_name(&display_name(c), c)
                .to_lowercase()
                .contains(&needle)
        })
        .collect()
}
