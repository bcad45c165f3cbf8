use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One checklist entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub text: String,
    #[serde(default)]
    pub checked: bool,
}

impl Item {
    pub fn new(text: impl Into<String>, checked: bool) -> Self {
        Self {
            text: text.into(),
            checked,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_blank(&self) -> bool {
        self.text.is_empty() && !self.checked
    }
}

/// The payload the editor flushes to the note endpoint.
///
/// Items travel under `body` on the wire, matching what the endpoint expects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    #[serde(default)]
    pub title: String,
    #[serde(rename = "body", default)]
    pub items: Vec<Item>,
}

impl Note {
    pub fn new(title: impl Into<String>, items: Vec<Item>) -> Self {
        Self {
            title: title.into(),
            items,
        }
    }

    /// A note holding a single empty row, the state a fresh editor starts from.
    pub fn blank(title: impl Into<String>) -> Self {
        Self::new(title, vec![Item::empty()])
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let note: Note = serde_json::from_str(raw).context("parsing note json")?;
        Ok(note.normalized())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("serialising note json")
    }

    /// Restores the at-least-one-row invariant for notes coming from outside.
    pub fn normalized(mut self) -> Self {
        if self.items.is_empty() {
            self.items.push(Item::empty());
        }
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn checked_count(&self) -> usize {
        self.items.iter().filter(|item| item.checked).count()
    }
}
