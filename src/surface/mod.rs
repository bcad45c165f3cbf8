//! The document the editor works against.
//!
//! The editor never owns row storage. It reads and mutates rows through
//! [`NoteSurface`]. [`MemorySurface`] is the headless implementation used by
//! tests and by the terminal front end.

use std::fmt;

use bitflags::bitflags;

use crate::model::Item;

mod memory;

pub use memory::MemorySurface;

/// Attribute carrying the anti-forgery token attached to every save.
pub const CSRF_ATTRIBUTE: &str = "data-csrf";

/// Stable handle for a row. Handles are never reused within one surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(u64);

impl RowId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row#{}", self.0)
    }
}

bitflags! {
    /// Visual state of a row's text element.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RowStyle: u8 {
        const CHECKED = 0b0000_0001;
        const FADING = 0b0000_0010;
    }
}

pub trait NoteSurface {
    /// Whether the editor container exists at all.
    fn is_mounted(&self) -> bool;

    fn title(&self) -> String;

    /// Row handles in visual order.
    fn rows(&self) -> Vec<RowId>;

    fn contains(&self, row: RowId) -> bool {
        self.rows().contains(&row)
    }

    fn text(&self, row: RowId) -> Option<String>;

    fn set_text(&mut self, row: RowId, text: &str) -> bool;

    fn is_checked(&self, row: RowId) -> Option<bool>;

    fn set_checked(&mut self, row: RowId, checked: bool) -> bool;

    fn style(&self, row: RowId) -> Option<RowStyle>;

    fn set_style(&mut self, row: RowId, style: RowStyle) -> bool;

    /// Inserts a row directly after `anchor`, or at the top when `anchor` is
    /// `None`. Returns `None` if the anchor is unknown.
    fn insert_row_after(&mut self, anchor: Option<RowId>, item: &Item) -> Option<RowId>;

    fn remove_row(&mut self, row: RowId) -> bool;

    /// Moves focus to `row` with the caret at byte offset `caret`, clamped to
    /// the row's text.
    fn focus_row(&mut self, row: RowId, caret: usize) -> bool;

    fn focused_row(&self) -> Option<RowId>;

    /// Caret byte offset inside the focused row.
    fn caret(&self) -> Option<usize>;

    fn attribute(&self, name: &str) -> Option<String>;
}
