//! Mutation paths and update requests.

use std::fmt;
use std::rc::Rc;

use crate::value::Value;

pub type Predicate = Rc<dyn Fn(&Value) -> bool>;

/// One step of a mutation path.
#[derive(Clone)]
pub enum Segment {
    Key(String),
    Index(usize),
    /// Fan out to every element of a sequence the predicate accepts. The
    /// predicate sees the full element, containers wrapped in `Tracked`.
    Filter(Predicate),
}

impl Segment {
    pub fn filter(predicate: impl Fn(&Value) -> bool + 'static) -> Self {
        Segment::Filter(Rc::new(predicate))
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => write!(f, "Key({key:?})"),
            Segment::Index(i) => write!(f, "Index({i})"),
            Segment::Filter(_) => f.write_str("Filter(..)"),
        }
    }
}

impl From<&str> for Segment {
    fn from(key: &str) -> Self {
        Segment::Key(key.to_string())
    }
}

impl From<String> for Segment {
    fn from(key: String) -> Self {
        Segment::Key(key)
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Segment::Index(index)
    }
}

/// Ordered path segments, built with the chaining helpers or converted
/// from an array of keys.
#[derive(Debug, Clone, Default)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.segments.push(Segment::Key(key.into()));
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.segments.push(Segment::Index(index));
        self
    }

    pub fn filter(mut self, predicate: impl Fn(&Value) -> bool + 'static) -> Self {
        self.segments.push(Segment::filter(predicate));
        self
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl From<Vec<Segment>> for Path {
    fn from(segments: Vec<Segment>) -> Self {
        Self { segments }
    }
}

impl<const N: usize> From<[&str; N]> for Path {
    fn from(keys: [&str; N]) -> Self {
        Self {
            segments: keys.into_iter().map(Segment::from).collect(),
        }
    }
}

impl From<&str> for Path {
    fn from(key: &str) -> Self {
        Self {
            segments: vec![Segment::from(key)],
        }
    }
}

/// What to write at the end of a path.
pub enum Update {
    Replace(Value),
    /// Delete the key, or the element of a sequence.
    Remove,
    /// Compute the new value from the current one; `None` removes.
    Transform(Box<dyn Fn(Option<&Value>) -> Option<Value>>),
    /// Edit a copy of the current value in place and write it back.
    MutateInPlace(Box<dyn Fn(&mut Value)>),
}

impl Update {
    pub fn replace(value: impl Into<Value>) -> Self {
        Update::Replace(value.into())
    }

    pub fn transform(f: impl Fn(Option<&Value>) -> Option<Value> + 'static) -> Self {
        Update::Transform(Box::new(f))
    }

    pub fn mutate_in_place(f: impl Fn(&mut Value) + 'static) -> Self {
        Update::MutateInPlace(Box::new(f))
    }
}

impl fmt::Debug for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Update::Replace(value) => f.debug_tuple("Replace").field(value).finish(),
            Update::Remove => f.write_str("Remove"),
            Update::Transform(_) => f.write_str("Transform(..)"),
            Update::MutateInPlace(_) => f.write_str("MutateInPlace(..)"),
        }
    }
}

impl From<Value> for Update {
    fn from(value: Value) -> Self {
        Update::Replace(value)
    }
}
