/// Top-level stages of a screening session.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Instructions,
    Testing,
    Complete,
}

impl SessionPhase {
    pub fn next(&self) -> Option<Self> {
        use SessionPhase::*;
        Some(match self {
            Instructions => Testing,
            Testing => Complete,
            Complete => return None,
        })
    }
}
