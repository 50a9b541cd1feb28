//! Per-call traversal state: the stack of enclosing composites and the path
//! of the field being translated.

use std::fmt::Write as _;

#[derive(Debug)]
struct Frame<'p, S> {
    type_name: &'p str,
    subject: S,
    /// Length values decoded in this composite, by key.
    lengths: Vec<(&'p str, i128)>,
}

/// One step of a field path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'p> {
    Field(&'p str),
    Index(usize),
}

/// LIFO stack of composite frames built during one serialize or deserialize
/// call. `S` is the live subject of each frame: the borrowed field map being
/// encoded, or the map being built while decoding.
#[derive(Debug)]
pub struct TraversalContext<'p, S> {
    frames: Vec<Frame<'p, S>>,
    path: Vec<Segment<'p>>,
}

impl<'p, S> Default for TraversalContext<'p, S> {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            path: Vec::new(),
        }
    }
}

impl<'p, S> TraversalContext<'p, S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_frame(&mut self, type_name: &'p str, subject: S) {
        self.frames.push(Frame {
            type_name,
            subject,
            lengths: Vec::new(),
        });
    }

    /// Removes the innermost frame and returns its subject.
    pub fn pop_frame(&mut self) -> Option<S> {
        self.frames.pop().map(|frame| frame.subject)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn subject(&self) -> Option<&S> {
        self.frames.last().map(|frame| &frame.subject)
    }

    pub fn subject_mut(&mut self) -> Option<&mut S> {
        self.frames.last_mut().map(|frame| &mut frame.subject)
    }

    /// Subject of the innermost frame whose composite type is `type_name`.
    pub fn find_subject(&self, type_name: &str) -> Option<&S> {
        self.frames
            .iter()
            .rev()
            .find(|frame| frame.type_name == type_name)
            .map(|frame| &frame.subject)
    }

    pub fn enter(&mut self, field: &'p str) {
        self.path.push(Segment::Field(field));
    }

    pub fn enter_index(&mut self, index: usize) {
        self.path.push(Segment::Index(index));
    }

    pub fn leave(&mut self) {
        self.path.pop();
    }

    /// Dotted path from the root, e.g. `header.items[2].name`.
    pub fn path(&self) -> String {
        format_path(self.path.iter().copied())
    }

    /// Path of a member reached from the enclosing composite: the innermost
    /// segment is replaced by `members`.
    pub fn sibling_path(&self, members: &[String]) -> String {
        let mut segments: Vec<Segment<'_>> = self.path[..self.path.len().saturating_sub(1)].to_vec();
        segments.extend(members.iter().map(|name| Segment::Field(name.as_str())));
        format_path(segments.into_iter())
    }

    /// Records a decoded length value on the innermost frame.
    pub fn record_length(&mut self, key: &'p str, value: i128) {
        if let Some(frame) = self.frames.last_mut() {
            frame.lengths.push((key, value));
        }
    }

    /// Length value recorded under `key`, `up` frames above the innermost one.
    pub fn length(&self, up: usize, key: &str) -> Option<i128> {
        let index = self.frames.len().checked_sub(up + 1)?;
        self.frames[index]
            .lengths
            .iter()
            .rev()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| *value)
    }
}

fn format_path<'s>(segments: impl Iterator<Item = Segment<'s>>) -> String {
    let mut path = String::new();
    for segment in segments {
        match segment {
            Segment::Field(name) => {
                if !path.is_empty() {
                    path.push('.');
                }
                path.push_str(name);
            }
            Segment::Index(index) => {
                let _ = write!(path, "[{index}]");
            }
        }
    }

    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_formatting() {
        let mut ctx = TraversalContext::<()>::new();
        assert_eq!(ctx.path(), "");

        ctx.enter("outer");
        ctx.enter("items");
        ctx.enter_index(2);
        ctx.enter("name");
        assert_eq!(ctx.path(), "outer.items[2].name");

        ctx.leave();
        ctx.leave();
        assert_eq!(ctx.path(), "outer.items");
    }

    #[test]
    fn test_sibling_path() {
        let mut ctx = TraversalContext::<()>::new();
        ctx.enter("outer");
        ctx.enter("len");

        let members = ["body".to_string(), "text".to_string()];
        assert_eq!(ctx.sibling_path(&members), "outer.body.text");
        assert_eq!(ctx.sibling_path(&members[..1]), "outer.body");

        ctx.leave();
        ctx.leave();
        ctx.enter("len");
        assert_eq!(ctx.sibling_path(&members[..1]), "body");
    }

    #[test]
    fn test_find_subject_innermost_first() {
        let mut ctx = TraversalContext::new();
        ctx.push_frame("Node", 1);
        ctx.push_frame("Leaf", 2);
        ctx.push_frame("Node", 3);

        assert_eq!(ctx.find_subject("Node"), Some(&3));
        assert_eq!(ctx.find_subject("Leaf"), Some(&2));
        assert_eq!(ctx.find_subject("Root"), None);

        assert_eq!(ctx.pop_frame(), Some(3));
        assert_eq!(ctx.find_subject("Node"), Some(&1));
    }

    #[test]
    fn test_lengths_by_frame() {
        let mut ctx = TraversalContext::new();
        ctx.push_frame("Outer", ());
        ctx.record_length("payload", 4);
        ctx.push_frame("Inner", ());
        ctx.record_length("name", 2);

        assert_eq!(ctx.length(0, "name"), Some(2));
        assert_eq!(ctx.length(1, "payload"), Some(4));
        assert_eq!(ctx.length(0, "payload"), None);
        assert_eq!(ctx.length(2, "payload"), None);
    }
}
