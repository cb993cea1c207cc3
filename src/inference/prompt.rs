use crate::error::ChatResult;
use crate::message::{validate_messages, Message, MessageDraft, Role};

/// Renders the conversation as `"<Label>: <content>\n"` lines followed by an
/// open assistant label the model continues from.
pub fn render_prompt(messages: &[Message]) -> String {
    let mut prompt = String::new();
    for message in messages {
        prompt.push_str(message.role.label());
        prompt.push_str(": ");
        prompt.push_str(&message.content);
        prompt.push('\n');
    }
    prompt.push_str(Role::Assistant.label());
    prompt.push(':');
    prompt
}

/// Validates raw wire messages and renders them. A missing role or content
/// is rejected as `InvalidInput`.
pub fn build_prompt(drafts: Vec<MessageDraft>) -> ChatResult<(Vec<Message>, String)> {
    let messages = validate_messages(drafts)?;
    let prompt = render_prompt(&messages);
    Ok((messages, prompt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatError;

    #[test]
    fn renders_lines_in_order_with_open_assistant_turn() {
        let messages = vec![
            Message::new(Role::System, "You are helpful"),
            Message::new(Role::User, "Hi"),
        ];
        let prompt = render_prompt(&messages);
        assert_eq!(prompt, "System: You are helpful\nUser: Hi\nAssistant:");
        assert!(prompt.ends_with("\nUser: Hi\nAssistant:"));
    }

    #[test]
    fn empty_conversation_is_just_the_open_label() {
        assert_eq!(render_prompt(&[]), "Assistant:");
    }

    #[test]
    fn empty_content_renders_an_empty_line() {
        let prompt = render_prompt(&[Message::new(Role::User, "")]);
        assert_eq!(prompt, "User: \nAssistant:");
    }

    #[test]
    fn lines_round_trip_to_the_input() {
        let messages = vec![
            Message::new(Role::System, "rules"),
            Message::new(Role::User, "question one"),
            Message::new(Role::Assistant, "answer one"),
            Message::new(Role::User, "question two"),
        ];
        let prompt = render_prompt(&messages);
        assert_eq!(prompt, render_prompt(&messages));

        let mut lines: Vec<&str> = prompt.split('\n').collect();
        assert_eq!(lines.pop(), Some("Assistant:"));
        let parsed: Vec<Message> = lines
            .iter()
            .map(|line| {
                let (label, content) = line.split_once(": ").unwrap();
                let role = [Role::System, Role::User, Role::Assistant]
                    .into_iter()
                    .find(|role| role.label() == label)
                    .unwrap();
                Message::new(role, content)
            })
            .collect();
        assert_eq!(parsed, messages);
    }

    #[test]
    fn build_rejects_missing_role_before_rendering() {
        let drafts = vec![MessageDraft {
            role: None,
            content: Some("orphan".to_string()),
        }];
        assert!(matches!(build_prompt(drafts), Err(ChatError::InvalidInput(_))));
    }

    #[test]
    fn build_returns_validated_messages_and_prompt() {
        let drafts = vec![Message::new(Role::User, "Hi").into()];
        let (messages, prompt) = build_prompt(drafts).unwrap();
        assert_eq!(messages, vec![Message::new(Role::User, "Hi")]);
        assert_eq!(prompt, "User: Hi\nAssistant:");
    }
}
