pub mod app;
pub mod cli;
pub mod clock;
pub mod config;
pub mod editor;
pub mod events;
pub mod model;
pub mod surface;
pub mod sync;
pub mod ui;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use editor::NotepadEditor;
pub use model::{Item, Note};
