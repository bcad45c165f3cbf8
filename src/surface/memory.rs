use std::collections::HashMap;

use indexmap::IndexMap;
use unicode_segmentation::UnicodeSegmentation;

use super::{NoteSurface, RowId, RowStyle};
use crate::model::{Item, Note};

#[derive(Debug, Clone)]
struct RowState {
    text: String,
    checked: bool,
    style: RowStyle,
}

impl RowState {
    fn from_item(item: &Item) -> Self {
        let style = if item.checked {
            RowStyle::CHECKED
        } else {
            RowStyle::empty()
        };
        Self {
            text: item.text.clone(),
            checked: item.checked,
            style,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Focus {
    row: RowId,
    caret: usize,
}

/// Headless checklist document backed by an insertion-ordered map.
#[derive(Debug, Clone)]
pub struct MemorySurface {
    mounted: bool,
    title: String,
    rows: IndexMap<RowId, RowState>,
    next_id: u64,
    focus: Option<Focus>,
    attributes: HashMap<String, String>,
}

impl Default for MemorySurface {
    fn default() -> Self {
        Self {
            mounted: true,
            title: String::new(),
            rows: IndexMap::new(),
            next_id: 1,
            focus: None,
            attributes: HashMap::new(),
        }
    }
}

impl MemorySurface {
    /// Renders `note` as the initial state. An empty note still gets one row.
    pub fn from_note(note: &Note) -> Self {
        let mut surface = Self {
            title: note.title.clone(),
            ..Self::default()
        };
        for item in &note.items {
            surface.push_row(item);
        }
        if surface.rows.is_empty() {
            surface.push_row(&Item::empty());
        }
        surface
    }

    /// A surface whose container is missing; editors refuse to attach to it.
    pub fn unmounted() -> Self {
        Self {
            mounted: false,
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        self.attributes.insert(name.to_string(), value.into());
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn position(&self, row: RowId) -> Option<usize> {
        self.rows.get_index_of(&row)
    }

    pub fn row_at(&self, index: usize) -> Option<RowId> {
        self.rows.get_index(index).map(|(id, _)| *id)
    }

    pub fn blur(&mut self) {
        self.focus = None;
    }

    /// Inserts `ch` at the caret of the focused row.
    pub fn insert_char(&mut self, ch: char) -> bool {
        let Some(focus) = self.focus else {
            return false;
        };
        let Some(row) = self.rows.get_mut(&focus.row) else {
            return false;
        };
        let mut scratch = [0u8; 4];
        let encoded = ch.encode_utf8(&mut scratch);
        row.text.insert_str(focus.caret, encoded);
        self.focus = Some(Focus {
            row: focus.row,
            caret: focus.caret + encoded.len(),
        });
        true
    }

    /// Removes the grapheme before the caret of the focused row.
    pub fn erase_before_caret(&mut self) -> bool {
        let Some(focus) = self.focus else {
            return false;
        };
        if focus.caret == 0 {
            return false;
        }
        let Some(row) = self.rows.get_mut(&focus.row) else {
            return false;
        };
        let prev = prev_grapheme_boundary(&row.text, focus.caret);
        row.text.drain(prev..focus.caret);
        self.focus = Some(Focus {
            row: focus.row,
            caret: prev,
        });
        true
    }

    pub fn caret_left(&mut self) -> bool {
        self.move_caret(|text, caret| prev_grapheme_boundary(text, caret))
    }

    pub fn caret_right(&mut self) -> bool {
        self.move_caret(|text, caret| next_grapheme_boundary(text, caret))
    }

    pub fn caret_home(&mut self) -> bool {
        self.move_caret(|_, _| 0)
    }

    pub fn caret_end(&mut self) -> bool {
        self.move_caret(|text, _| text.len())
    }

    fn move_caret(&mut self, step: impl Fn(&str, usize) -> usize) -> bool {
        let Some(focus) = self.focus else {
            return false;
        };
        let Some(row) = self.rows.get(&focus.row) else {
            return false;
        };
        let target = step(&row.text, focus.caret);
        if target == focus.caret {
            return false;
        }
        self.focus = Some(Focus {
            row: focus.row,
            caret: target,
        });
        true
    }

    fn push_row(&mut self, item: &Item) -> RowId {
        let id = self.allocate_id();
        self.rows.insert(id, RowState::from_item(item));
        id
    }

    fn allocate_id(&mut self) -> RowId {
        let id = RowId::new(self.next_id);
        self.next_id += 1;
        id
    }
}

impl NoteSurface for MemorySurface {
    fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn title(&self) -> String {
        self.title.clone()
    }

    fn rows(&self) -> Vec<RowId> {
        self.rows.keys().copied().collect()
    }

    fn contains(&self, row: RowId) -> bool {
        self.rows.contains_key(&row)
    }

    fn text(&self, row: RowId) -> Option<String> {
        self.rows.get(&row).map(|state| state.text.clone())
    }

    fn set_text(&mut self, row: RowId, text: &str) -> bool {
        let Some(state) = self.rows.get_mut(&row) else {
            return false;
        };
        state.text.clear();
        state.text.push_str(text);
        if let Some(focus) = self.focus.as_mut() {
            if focus.row == row {
                focus.caret = clamp_to_char_boundary(text, focus.caret);
            }
        }
        true
    }

    fn is_checked(&self, row: RowId) -> Option<bool> {
        self.rows.get(&row).map(|state| state.checked)
    }

    fn set_checked(&mut self, row: RowId, checked: bool) -> bool {
        match self.rows.get_mut(&row) {
            Some(state) => {
                state.checked = checked;
                true
            }
            None => false,
        }
    }

    fn style(&self, row: RowId) -> Option<RowStyle> {
        self.rows.get(&row).map(|state| state.style)
    }

    fn set_style(&mut self, row: RowId, style: RowStyle) -> bool {
        match self.rows.get_mut(&row) {
            Some(state) => {
                state.style = style;
                true
            }
            None => false,
        }
    }

    fn insert_row_after(&mut self, anchor: Option<RowId>, item: &Item) -> Option<RowId> {
        let index = match anchor {
            Some(anchor) => self.rows.get_index_of(&anchor)? + 1,
            None => 0,
        };
        let id = self.allocate_id();
        self.rows.shift_insert(index, id, RowState::from_item(item));
        Some(id)
    }

    fn remove_row(&mut self, row: RowId) -> bool {
        if self.rows.shift_remove(&row).is_none() {
            return false;
        }
        if self.focus.map(|focus| focus.row) == Some(row) {
            self.focus = None;
        }
        true
    }

    fn focus_row(&mut self, row: RowId, caret: usize) -> bool {
        let Some(state) = self.rows.get(&row) else {
            return false;
        };
        let caret = clamp_to_char_boundary(&state.text, caret);
        self.focus = Some(Focus { row, caret });
        true
    }

    fn focused_row(&self) -> Option<RowId> {
        self.focus.map(|focus| focus.row)
    }

    fn caret(&self) -> Option<usize> {
        self.focus.map(|focus| focus.caret)
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.attributes.get(name).cloned()
    }
}

fn clamp_to_char_boundary(text: &str, caret: usize) -> usize {
    let mut caret = caret.min(text.len());
    while !text.is_char_boundary(caret) {
        caret -= 1;
    }
    caret
}

fn prev_grapheme_boundary(text: &str, cursor: usize) -> usize {
    if cursor == 0 {
        return 0;
    }
    let mut last = 0;
    for (idx, _) in text[..cursor].grapheme_indices(true) {
        last = idx;
    }
    last
}

fn next_grapheme_boundary(text: &str, cursor: usize) -> usize {
    if cursor >= text.len() {
        return text.len();
    }
    match text[cursor..].graphemes(true).next() {
        Some(grapheme) => cursor + grapheme.len(),
        None => text.len(),
    }
}
