//! Presence checks for outgoing messages and new conversations.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// True for empty or whitespace-only input.
pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

/// Body of `POST /chat/start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewConversation {
    /// Creator first, then the selected users in selection order.
    pub participants: Vec<String>,
    pub is_group: bool,
    pub group_name: Option<String>,
}

impl NewConversation {
    /// Build the request for `creator_id` plus `selected`.
    ///
    /// The creator and duplicate selections are dropped from `selected`.
    /// More than one remaining user makes a group, which needs a non-blank
    /// name.
    pub fn validate(
        creator_id: &str,
        selected: &[String],
        group_name: &str,
    ) -> Result<Self, ValidationError> {
        let mut others: Vec<String> = Vec::with_capacity(selected.len());
        for id in selected {
            if id != creator_id && !others.contains(id) {
                others.push(id.clone());
            }
        }

        if others.is_empty() {
            return Err(ValidationError::NoParticipants);
        }

        let is_group = others.len() > 1;
        let group_name = if is_group {
            let name = group_name.trim();
            if name.is_empty() {
                return Err(ValidationError::MissingGroupName);
            }
            Some(name.to_string())
        } else {
            None
        };

        let mut participants = Vec::with_capacity(others.len() + 1);
        participants.push(creator_id.to_string());
        participants.extend(others);

        Ok(Self {
            participants,
            is_group,
            group_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn blank_detection() {
        assert!(is_blank(""));
        assert!(is_blank("   \t\n"));
        assert!(!is_blank(" a "));
    }

    #[test]
    fn one_participant_without_name() {
        let nc = NewConversation::validate("1", &ids(&["2"]), "").unwrap();
        assert_eq!(nc.participants, ids(&["1", "2"]));
        assert!(!nc.is_group);
        assert!(nc.group_name.is_none());
    }

    #[test]
    fn one_participant_ignores_name() {
        let nc = NewConversation::validate("1", &ids(&["2"]), "ignored").unwrap();
        assert!(nc.group_name.is_none());
    }

    #[test]
    fn two_participants_without_name() {
        assert_eq!(
            NewConversation::validate("1", &ids(&["2", "3"]), "  "),
            Err(ValidationError::MissingGroupName)
        );
    }

    #[test]
    fn group_with_name() {
        let nc = NewConversation::validate("1", &ids(&["2", "3"]), "  Team ").unwrap();
        assert!(nc.is_group);
        assert_eq!(nc.group_name.as_deref(), Some("Team"));
        assert_eq!(nc.participants, ids(&["1", "2", "3"]));
    }

    #[test]
    fn nobody_selected() {
        assert_eq!(
            NewConversation::validate("1", &[], "x"),
            Err(ValidationError::NoParticipants)
        );
    }

    #[test]
    fn only_self_selected() {
        assert_eq!(
            NewConversation::validate("1", &ids(&["1"]), ""),
            Err(ValidationError::NoParticipants)
        );
    }

    #[test]
    fn duplicates_collapse_to_private() {
        let nc = NewConversation::validate("1", &ids(&["2", "2"]), "").unwrap();
        assert!(!nc.is_group);
        assert_eq!(nc.participants, ids(&["1", "2"]));
    }

    #[test]
    fn wire_shape() {
        let nc = NewConversation::validate("1", &ids(&["2"]), "").unwrap();
        assert_eq!(
            serde_json::to_value(&nc).unwrap(),
            serde_json::json!({"participants": ["1", "2"], "is_group": false, "group_name": null})
        );
    }
}
