/// Emitted when the user submits the input box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submit {
    pub content: String,
}

impl Submit {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Emitted when the user asks to stop the reply being streamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Stop;
