use crate::formatting::CALLBACK_DATA_MAX_BYTES;

/// A rendered menu screen: HTML text plus an optional inline keyboard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Screen {
    pub html: String,
    pub keyboard: Option<InlineKeyboard>,
}

impl Screen {
    pub fn text(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(html: impl Into<String>, keyboard: InlineKeyboard) -> Self {
        Self {
            html: html.into(),
            keyboard: Some(keyboard),
        }
    }
}

/// Inline keyboard (rows of callback buttons).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            callback_data: callback_data.into(),
        }
    }

    /// `None` when `callback_data` would not fit Telegram's callback budget.
    pub fn checked(label: impl Into<String>, callback_data: impl Into<String>) -> Option<Self> {
        let callback_data = callback_data.into();
        if callback_data.len() > CALLBACK_DATA_MAX_BYTES {
            return None;
        }
        Some(Self::new(label, callback_data))
    }
}

impl InlineKeyboard {
    pub fn row(mut self, row: Vec<InlineButton>) -> Self {
        self.rows.push(row);
        self
    }

    pub fn buttons(&self) -> impl Iterator<Item = &InlineButton> {
        self.rows.iter().flatten()
    }
}

/// Capabilities / feature flags of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub max_message_len: usize,
    pub max_caption_len: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_rejects_oversized_callback_data() {
        assert!(InlineButton::checked("x", "a".repeat(64)).is_some());
        assert!(InlineButton::checked("x", "a".repeat(65)).is_none());
    }

    #[test]
    fn buttons_flattens_rows() {
        let kb = InlineKeyboard::default()
            .row(vec![InlineButton::new("a", "1"), InlineButton::new("b", "2")])
            .row(vec![InlineButton::new("c", "3")]);
        let data: Vec<&str> = kb.buttons().map(|b| b.callback_data.as_str()).collect();
        assert_eq!(data, vec!["1", "2", "3"]);
    }
}
