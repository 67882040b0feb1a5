use serde::{Deserialize, Serialize};

pub type FileId = u64;

/// Source location carried through from the parser. The core never computes
/// spans, it only forwards them into errors and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub file: FileId,
    pub lo: u32,
    pub hi: u32,
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Span({}:{}-{})", self.file, self.lo, self.hi)
    }
}

impl Span {
    pub fn new(file: FileId, lo: u32, hi: u32) -> Span {
        Span { file, lo, hi }
    }

    /// Span for nodes synthesized by the core itself.
    pub fn dummy() -> Span {
        Span::default()
    }

    pub fn is_dummy(&self) -> bool {
        *self == Span::default()
    }
}
