//! Chat timeline: the ordered list of chat lines, system notices and poll
//! cards the lobby shows.
//!
//! Poll cards are keyed by poll id. A card is placed where its poll was first
//! seen and is replaced in place by later snapshots of the same poll.

use crate::model::Poll;

#[derive(Debug, Clone, PartialEq)]
pub enum TimelineItem {
    Chat { sender: String, text: String },
    System { text: String },
    Poll(Poll),
}

impl TimelineItem {
    fn poll_id(&self) -> Option<&str> {
        match self {
            TimelineItem::Poll(p) => Some(&p.id),
            _ => None,
        }
    }
}

/// What a timeline mutation did, so a renderer can patch instead of redraw.
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineChange {
    Appended(usize),
    Replaced(usize),
}

#[derive(Debug, Default, Clone)]
pub struct Timeline {
    items: Vec<TimelineItem>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chat(&mut self, sender: impl Into<String>, text: impl Into<String>) -> TimelineChange {
        self.push(TimelineItem::Chat {
            sender: sender.into(),
            text: text.into(),
        })
    }

    pub fn push_system(&mut self, text: impl Into<String>) -> TimelineChange {
        self.push(TimelineItem::System { text: text.into() })
    }

    /// Show the card for `poll`: replace an existing card with the same id,
    /// otherwise append a new one.
    pub fn upsert_poll(&mut self, poll: Poll) -> TimelineChange {
        match self.items.iter().position(|i| i.poll_id() == Some(poll.id.as_str())) {
            Some(idx) => {
                self.items[idx] = TimelineItem::Poll(poll);
                TimelineChange::Replaced(idx)
            }
            None => self.push(TimelineItem::Poll(poll)),
        }
    }

    pub fn items(&self) -> &[TimelineItem] {
        &self.items
    }

    pub fn get(&self, idx: usize) -> Option<&TimelineItem> {
        self.items.get(idx)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    fn push(&mut self, item: TimelineItem) -> TimelineChange {
        self.items.push(item);
        TimelineChange::Appended(self.items.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poll(id: &str, question: &str, votes: usize) -> Poll {
        Poll {
            id: id.into(),
            question: question.into(),
            options: vec!["a".into(), "b".into()],
            created_by: "A".into(),
            votes: (0..votes).map(|i| (i.to_string(), "a".to_string())).collect(),
        }
    }

    #[test]
    fn chat_and_system_append_in_order() {
        let mut t = Timeline::new();
        assert_eq!(t.push_system("B joined the chat."), TimelineChange::Appended(0));
        assert_eq!(t.push_chat("B", "hi"), TimelineChange::Appended(1));
        assert_eq!(t.len(), 2);
        assert!(matches!(t.get(0), Some(TimelineItem::System { .. })));
    }

    #[test]
    fn poll_update_replaces_in_place() {
        let mut t = Timeline::new();
        t.push_chat("A", "before");
        t.upsert_poll(poll("p1", "Q", 0));
        t.push_chat("A", "after");
        assert_eq!(t.upsert_poll(poll("p1", "Q", 2)), TimelineChange::Replaced(1));
        assert_eq!(t.len(), 3);
        match t.get(1) {
            Some(TimelineItem::Poll(p)) => assert_eq!(p.votes.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn polls_with_same_question_keep_separate_cards() {
        let mut t = Timeline::new();
        t.upsert_poll(poll("p1", "Budget?", 0));
        t.upsert_poll(poll("p2", "Budget?", 0));
        t.upsert_poll(poll("p2", "Budget?", 1));
        assert_eq!(t.len(), 2);
        match t.get(0) {
            Some(TimelineItem::Poll(p)) => assert!(p.votes.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn clear_empties() {
        let mut t = Timeline::new();
        t.push_chat("A", "x");
        t.clear();
        assert!(t.is_empty());
    }
}
