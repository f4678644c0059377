use tracing::trace;

use super::{ChatMessage, ConversationTurn, IMAGE_PLACEHOLDER, ImageReference, Role};
use crate::error::{AdapterError, Result};

/// Prior exchanges plus the most recent user utterance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairedHistory {
    pub history: Vec<(String, String)>,
    pub query: String,
    /// Images attached to the turn that produced `query`.
    pub query_images: Vec<ImageReference>,
}

/// Split turns into `(user, assistant)` pairs and the latest user utterance.
///
/// System turns are not forwarded. A user turn carrying images is prefixed with
/// a single `<image>` line regardless of how many references it holds. The most
/// recent user turn stays pending after it is answered, so consecutive
/// assistant turns pair with the same utterance and it is also the query.
pub fn extract_paired_history(turns: &[ConversationTurn]) -> Result<PairedHistory> {
    let mut history = Vec::new();
    let mut pending: Option<(String, Vec<ImageReference>)> = None;

    for (idx, turn) in turns.iter().enumerate() {
        match turn.role()? {
            Role::System => continue,
            Role::User => {
                let images = turn.images().to_vec();
                let content = if turn.image.is_some() {
                    format!("{IMAGE_PLACEHOLDER}\n{}", turn.content)
                } else {
                    turn.content.clone()
                };
                pending = Some((content, images));
            }
            Role::Assistant => {
                let (user, _) = pending.as_ref().ok_or_else(|| {
                    AdapterError::malformed(format!(
                        "assistant turn {idx} has no preceding user turn"
                    ))
                })?;
                history.push((user.clone(), turn.content.clone()));
            }
        }
    }

    let (query, query_images) = pending.ok_or_else(|| {
        AdapterError::malformed("conversation has no user turn")
    })?;
    trace!(
        pairs = history.len(),
        images = query_images.len(),
        "extracted paired history"
    );
    Ok(PairedHistory {
        history,
        query,
        query_images,
    })
}

/// Rewrite turns so every user turn leads with one `<image>` per attached image.
///
/// System and assistant turns pass through unchanged. Returns the rewritten
/// messages and all image references in collection order.
pub fn inline_image_placeholders(
    turns: &[ConversationTurn],
) -> Result<(Vec<ChatMessage>, Vec<ImageReference>)> {
    let mut messages = Vec::with_capacity(turns.len());
    let mut images = Vec::new();

    for (idx, turn) in turns.iter().enumerate() {
        let role = turn.role()?;
        if role != Role::User {
            messages.push(ChatMessage::new(role, turn.content.clone()));
            continue;
        }
        if turn.image.is_some() && turn.images().is_empty() {
            return Err(AdapterError::malformed(format!(
                "user turn {idx} has an empty image list"
            )));
        }
        let mut content = IMAGE_PLACEHOLDER.repeat(turn.images().len());
        content.push('\n');
        content.push_str(&turn.content);
        images.extend(turn.images().iter().cloned());
        messages.push(ChatMessage::new(Role::User, content));
    }

    Ok((messages, images))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moderator() -> ConversationTurn {
        ConversationTurn {
            role: "moderator".into(),
            content: "order!".into(),
            image: None,
        }
    }

    #[test]
    fn paired_history_drops_system_and_keeps_last_query() {
        let turns = vec![
            ConversationTurn::system("be brief"),
            ConversationTurn::user("A"),
            ConversationTurn::assistant("B"),
            ConversationTurn::user("C"),
        ];
        let paired = extract_paired_history(&turns).expect("valid conversation");
        assert_eq!(paired.history, vec![("A".to_string(), "B".to_string())]);
        assert_eq!(paired.query, "C");
        assert!(paired.query_images.is_empty());
    }

    #[test]
    fn paired_history_prefixes_image_turns() {
        let turns = vec![
            ConversationTurn::user("what is this?").with_image("first.png"),
            ConversationTurn::assistant("a cat"),
            ConversationTurn::user("and these?").with_images(["x.png", "y.png"]),
        ];
        let paired = extract_paired_history(&turns).expect("valid conversation");
        assert_eq!(paired.history[0].0, "<image>\nwhat is this?");
        assert_eq!(paired.query, "<image>\nand these?");
        assert_eq!(
            paired.query_images,
            vec![ImageReference::from("x.png"), ImageReference::from("y.png")]
        );
    }

    #[test]
    fn paired_history_requires_a_user_turn() {
        let err = extract_paired_history(&[ConversationTurn::system("rules")]).unwrap_err();
        assert!(matches!(err, AdapterError::MalformedConversation(_)));
    }

    #[test]
    fn answered_user_turn_stays_pending() {
        let turns = vec![
            ConversationTurn::user("A"),
            ConversationTurn::assistant("B"),
            ConversationTurn::assistant("C"),
            ConversationTurn::user("D"),
        ];
        let paired = extract_paired_history(&turns).expect("valid conversation");
        assert_eq!(
            paired.history,
            vec![
                ("A".to_string(), "B".to_string()),
                ("A".to_string(), "C".to_string()),
            ]
        );
        assert_eq!(paired.query, "D");

        let answered = vec![
            ConversationTurn::user("A").with_image("a.png"),
            ConversationTurn::assistant("B"),
        ];
        let paired = extract_paired_history(&answered).expect("valid conversation");
        assert_eq!(paired.history, vec![("<image>\nA".to_string(), "B".to_string())]);
        assert_eq!(paired.query, "<image>\nA");
        assert_eq!(paired.query_images, vec![ImageReference::from("a.png")]);
    }

    #[test]
    fn paired_history_rejects_orphan_assistant_turn() {
        let turns = vec![
            ConversationTurn::assistant("hello"),
            ConversationTurn::user("hi"),
        ];
        assert!(matches!(
            extract_paired_history(&turns),
            Err(AdapterError::MalformedConversation(_))
        ));
    }

    #[test]
    fn inline_placeholders_follow_collection_order() {
        let turns = vec![
            ConversationTurn::system("sys"),
            ConversationTurn::user("describe").with_images(["u1.png", "u2.png"]),
            ConversationTurn::assistant("two dogs"),
            ConversationTurn::user("and this").with_image("u3.png"),
        ];
        let (messages, images) = inline_image_placeholders(&turns).expect("valid conversation");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], ChatMessage::new(Role::System, "sys"));
        assert_eq!(messages[1].content, "<image><image>\ndescribe");
        assert_eq!(messages[2], ChatMessage::new(Role::Assistant, "two dogs"));
        assert_eq!(messages[3].content, "<image>\nand this");
        let names: Vec<&str> = images.iter().map(ImageReference::as_str).collect();
        assert_eq!(names, ["u1.png", "u2.png", "u3.png"]);
    }

    #[test]
    fn inline_placeholders_leave_input_untouched() {
        let turns = vec![ConversationTurn::user("plain text")];
        let snapshot = turns.clone();
        let (messages, images) = inline_image_placeholders(&turns).expect("valid conversation");
        assert_eq!(messages[0].content, "\nplain text");
        assert!(images.is_empty());
        assert_eq!(turns, snapshot);
    }

    #[test]
    fn inline_placeholders_reject_empty_image_list() {
        let turns = vec![ConversationTurn::user("nothing").with_images(Vec::<String>::new())];
        assert!(matches!(
            inline_image_placeholders(&turns),
            Err(AdapterError::MalformedConversation(_))
        ));
    }

    #[test]
    fn unknown_role_fails_in_both_conventions() {
        let turns = vec![ConversationTurn::user("hi"), moderator()];
        assert!(matches!(
            extract_paired_history(&turns),
            Err(AdapterError::MalformedConversation(_))
        ));
        assert!(matches!(
            inline_image_placeholders(&turns),
            Err(AdapterError::MalformedConversation(_))
        ));
    }
}
