use std::fmt::{self, Display, Formatter};

/// Index of a source text within one compilation.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy, Default, Hash)]
pub struct SourceId(u32);

impl SourceId {
    pub fn new(index: usize) -> Self {
        SourceId(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for SourceId {
    fn from(index: usize) -> Self {
        SourceId::new(index)
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A source unit that has already been read into memory.
#[derive(PartialEq, Eq, Debug, Clone, Hash)]
pub struct SourceText {
    pub name: String,
    pub text: String,
}

impl SourceText {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}
