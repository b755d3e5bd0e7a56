use crate::models::Message;

/// Ordered messages of the open conversation.
///
/// Append-only apart from wholesale `reset` / `replace_all` on a conversation
/// switch. Single messages are never removed.
#[derive(Debug, Default, Clone)]
pub struct MessageStore {
    messages: Vec<Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.messages.clear();
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Swaps in the loaded history of a newly selected conversation.
    pub fn replace_all(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, Timing};

    #[test]
    fn append_preserves_insertion_order() {
        let mut store = MessageStore::new();
        store.append(Message::user("first"));
        store.append(Message::assistant("second", Vec::new(), Timing(5)));
        store.append(Message::user("third"));

        let contents: Vec<&str> = store.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["first", "second", "third"]);
        assert_eq!(store.last().map(|m| m.role), Some(Role::User));
    }

    #[test]
    fn replace_all_discards_previous_messages() {
        let mut store = MessageStore::new();
        store.append(Message::user("old"));
        store.replace_all(vec![Message::user("a"), Message::bare_assistant("b")]);

        assert_eq!(store.len(), 2);
        assert!(store.messages().iter().all(|m| m.content != "old"));
    }

    #[test]
    fn reset_empties_the_store() {
        let mut store = MessageStore::new();
        store.append(Message::user("hello"));
        store.reset();
        assert!(store.is_empty());
        assert!(store.last().is_none());
    }
}
