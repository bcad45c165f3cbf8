use std::io::Stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use time::macros::format_description;

use crate::clock::{self, ClockFace, ClockState};
use crate::config::{AppConfig, ThemeName};
use crate::editor::NotepadEditor;
use crate::events::{EventSource, Key, NamedKey, TerminalEvents, UiEvent};
use crate::model::Note;
use crate::surface::{MemorySurface, NoteSurface, RowId, CSRF_ATTRIBUTE};
use crate::sync::{NoteTransport, SaveEvent, SaveQueue, SaveStatus, SaveTrigger, SaveWorker};
use crate::ui;

pub type Editor = NotepadEditor<MemorySurface, SaveQueue>;

/// One input for the front end: an editor event, or a key press to translate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    Ui(UiEvent),
    Key(KeyEvent),
}

impl From<UiEvent> for AppEvent {
    fn from(event: UiEvent) -> Self {
        AppEvent::Ui(event)
    }
}

impl From<KeyEvent> for AppEvent {
    fn from(key: KeyEvent) -> Self {
        AppEvent::Key(key)
    }
}

/// What a key press asks the front end to do.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Event(UiEvent),
    MoveFocus(isize),
    Refocus,
    Leave(RowId),
    ManualSave,
    ToggleTheme,
    Quit,
}

pub struct App {
    pub config: Arc<AppConfig>,
    editor: Editor,
    worker: SaveWorker,
    clock: ClockState,
    theme: ThemeName,
    status_message: Option<String>,
    last_focused: Option<RowId>,
    should_quit: bool,
    tick_rate: Duration,
}

impl App {
    pub fn new<T: NoteTransport>(
        config: Arc<AppConfig>,
        note: &Note,
        csrf_token: Option<String>,
        transport: T,
    ) -> Result<Self> {
        let mut surface = MemorySurface::from_note(note);
        if let Some(token) = csrf_token {
            surface.set_attribute(CSRF_ATTRIBUTE, token);
        }
        let worker = SaveWorker::spawn(transport).context("starting save worker")?;
        let editor = NotepadEditor::attach(surface, worker.queue(), config.editor.clone())
            .ok_or_else(|| anyhow!("notepad surface has no container"))?;
        let mut app = Self {
            theme: config.theme,
            tick_rate: config.tick_rate,
            config,
            editor,
            worker,
            clock: ClockState::new(),
            status_message: None,
            last_focused: None,
            should_quit: false,
        };
        if let Some(first) = app.editor.live_rows().first().copied() {
            app.dispatch(UiEvent::FocusIn { row: first });
        }
        app.clock.tick(clock::local_now());
        Ok(app)
    }

    pub fn run(&mut self) -> Result<()> {
        let mut terminal = setup_terminal()?;
        let mut events = TerminalEvents::new();
        let result = self.drive(&mut events, |app| {
            terminal
                .draw(|frame| ui::draw_app(frame, app))
                .map(|_| ())
                .context("rendering frame")
        });
        restore_terminal(&mut terminal)?;
        result
    }

    /// Unloads the editor if that has not happened yet, then stops the save
    /// worker after it has flushed everything queued.
    pub fn finish(mut self) -> Result<Vec<SaveEvent>> {
        self.quit();
        self.worker.shutdown()
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    pub fn theme(&self) -> ThemeName {
        self.theme
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn clock_face(&self) -> Option<&ClockFace> {
        self.clock.face()
    }

    pub fn save_status(&self) -> SaveStatus {
        self.worker.status()
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Renders, waits for input and runs timers until the app quits.
    ///
    /// A source that runs dry unloads the editor as if the user quit.
    fn drive<E, F>(&mut self, source: &mut E, mut render: F) -> Result<()>
    where
        E: EventSource,
        E::Event: Into<AppEvent>,
        F: FnMut(&App) -> Result<()>,
    {
        let mut last_tick = Instant::now();
        loop {
            render(self)?;

            if self.should_quit {
                break;
            }
            if source.is_exhausted() {
                self.quit();
                continue;
            }

            let mut timeout = self
                .tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or(Duration::ZERO);
            if let Some(deadline) = self.editor.next_deadline() {
                timeout = timeout.min(deadline.saturating_duration_since(Instant::now()));
            }

            if let Some(event) = source.next_event(timeout)? {
                match event.into() {
                    AppEvent::Ui(event) => self.dispatch(event),
                    AppEvent::Key(key) => self.handle_key(key),
                }
            }

            self.editor.poll();
            if last_tick.elapsed() >= self.tick_rate {
                self.on_tick();
                last_tick = Instant::now();
            }
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if let Some(input) = translate_key(key, self.editor.surface().focused_row()) {
            self.apply(input);
        }
    }

    fn apply(&mut self, input: Input) {
        match input {
            Input::Event(event) => self.dispatch(event),
            Input::MoveFocus(delta) => self.move_focus(delta),
            Input::Refocus => {
                let live = self.editor.live_rows();
                let target = self
                    .last_focused
                    .filter(|row| live.contains(row))
                    .or_else(|| live.first().copied());
                if let Some(row) = target {
                    self.dispatch(UiEvent::FocusIn { row });
                }
            }
            Input::Leave(row) => {
                self.dispatch(UiEvent::FocusOut { row });
                self.last_focused = Some(row);
                self.editor.surface_mut().blur();
            }
            Input::ManualSave => {
                self.editor.save(SaveTrigger::Manual);
                self.status_message = Some("Saving…".into());
            }
            Input::ToggleTheme => {
                self.theme = self.theme.toggled();
                tracing::debug!(theme = ?self.theme, "theme toggled");
            }
            Input::Quit => self.quit(),
        }
    }

    /// Runs the editor's handler, then the default behaviour if it declined.
    fn dispatch(&mut self, event: UiEvent) {
        let propagation = self.editor.handle(event.clone());
        if propagation.is_handled() {
            return;
        }
        let UiEvent::KeyDown { row, key } = event else {
            return;
        };
        if self.editor.surface().focused_row() != Some(row) {
            return;
        }
        let surface = self.editor.surface_mut();
        match key {
            Key::Char(ch) => {
                surface.insert_char(ch);
            }
            Key::Named(NamedKey::Backspace) => {
                surface.erase_before_caret();
            }
            Key::Named(NamedKey::Left) => {
                surface.caret_left();
            }
            Key::Named(NamedKey::Right) => {
                surface.caret_right();
            }
            Key::Named(NamedKey::Home) => {
                surface.caret_home();
            }
            Key::Named(NamedKey::End) => {
                surface.caret_end();
            }
            Key::Named(_) => {}
        }
    }

    fn move_focus(&mut self, delta: isize) {
        let live = self.editor.live_rows();
        let Some(current) = self.editor.surface().focused_row() else {
            return;
        };
        let Some(index) = live.iter().position(|row| *row == current) else {
            return;
        };
        let target = index
            .saturating_add_signed(delta)
            .min(live.len().saturating_sub(1));
        if target == index {
            return;
        }
        self.dispatch(UiEvent::FocusOut { row: current });
        self.dispatch(UiEvent::FocusIn { row: live[target] });
    }

    fn quit(&mut self) {
        if !self.editor.is_unloaded() {
            self.dispatch(UiEvent::PageUnload);
        }
        self.should_quit = true;
    }

    fn on_tick(&mut self) {
        self.editor.poll();
        for event in self.worker.drain_events() {
            self.handle_save_event(event);
        }
        self.clock.tick(clock::local_now());
    }

    fn handle_save_event(&mut self, event: SaveEvent) {
        match event {
            SaveEvent::Saved {
                trigger,
                items,
                timestamp,
            } => {
                let at = timestamp
                    .to_offset(clock::local_now().offset())
                    .format(format_description!("[hour]:[minute]:[second]"))
                    .unwrap_or_default();
                self.status_message = Some(format!(
                    "Saved {items} item{} ({trigger}) at {at}",
                    if items == 1 { "" } else { "s" }
                ));
            }
            SaveEvent::Failed { trigger, message } => {
                self.status_message = Some(format!("Save failed ({trigger}): {message}"));
            }
        }
    }
}

fn translate_key(key: KeyEvent, focused: Option<RowId>) -> Option<Input> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if ctrl {
        return match key.code {
            KeyCode::Char('c') | KeyCode::Char('q') => Some(Input::Quit),
            KeyCode::Char('s') => Some(Input::ManualSave),
            KeyCode::Char('t') => Some(Input::ToggleTheme),
            KeyCode::Char('d') => focused.map(|row| Input::Event(UiEvent::DeleteClicked { row })),
            KeyCode::Char('x') => {
                focused.map(|row| Input::Event(UiEvent::CheckboxToggled { row }))
            }
            _ => None,
        };
    }

    let Some(row) = focused else {
        return match key.code {
            KeyCode::Enter | KeyCode::Tab | KeyCode::Char('i') | KeyCode::Down | KeyCode::Up => {
                Some(Input::Refocus)
            }
            KeyCode::Char('q') => Some(Input::Quit),
            _ => None,
        };
    };

    let named = match key.code {
        KeyCode::Esc => return Some(Input::Leave(row)),
        KeyCode::Up => return Some(Input::MoveFocus(-1)),
        KeyCode::Down => return Some(Input::MoveFocus(1)),
        KeyCode::Char(ch) if !key.modifiers.intersects(KeyModifiers::ALT | KeyModifiers::SUPER) => {
            return Some(Input::Event(UiEvent::KeyDown {
                row,
                key: Key::Char(ch),
            }));
        }
        KeyCode::Enter => NamedKey::Enter,
        KeyCode::Backspace => NamedKey::Backspace,
        KeyCode::Delete => NamedKey::Delete,
        KeyCode::Tab => NamedKey::Tab,
        KeyCode::Left => NamedKey::Left,
        KeyCode::Right => NamedKey::Right,
        KeyCode::Home => NamedKey::Home,
        KeyCode::End => NamedKey::End,
        _ => return None,
    };
    Some(Input::Event(UiEvent::KeyDown {
        row,
        key: Key::Named(named),
    }))
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen).context("entering alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).context("creating terminal backend")
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode().context("disabling raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("leaving alternate screen")?;
    terminal.show_cursor().context("restoring cursor")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ScriptedEvents;
    use crate::model::Item;
    use crate::sync::{SaveRequest, TransportError};
    use parking_lot::Mutex;

    #[derive(Clone, Default)]
    struct RecordingTransport {
        delivered: Arc<Mutex<Vec<SaveRequest>>>,
    }

    impl NoteTransport for RecordingTransport {
        fn deliver(&self, request: &SaveRequest) -> Result<(), TransportError> {
            self.delivered.lock().push(request.clone());
            Ok(())
        }
    }

    fn app_with(note: Note) -> Result<(App, RecordingTransport)> {
        let transport = RecordingTransport::default();
        let app = App::new(
            Arc::new(AppConfig::default()),
            &note,
            Some("token".into()),
            transport.clone(),
        )?;
        Ok((app, transport))
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(ch: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(ch), KeyModifiers::CONTROL)
    }

    #[test]
    fn starts_focused_on_first_row() -> Result<()> {
        let (app, _) = app_with(Note::new("T", vec![Item::new("A", false), Item::new("B", false)]))?;
        let first = app.editor().live_rows()[0];
        assert_eq!(app.editor().surface().focused_row(), Some(first));
        assert_eq!(app.editor().surface().caret(), Some(1));
        app.finish()?;
        Ok(())
    }

    #[test]
    fn typing_and_commit_build_a_list() -> Result<()> {
        let (mut app, transport) = app_with(Note::blank("Groceries"))?;
        for ch in "milk".chars() {
            app.handle_key(press(KeyCode::Char(ch)));
        }
        app.handle_key(press(KeyCode::Enter));
        for ch in "eggs".chars() {
            app.handle_key(press(KeyCode::Char(ch)));
        }
        app.handle_key(ctrl('x'));
        app.handle_key(ctrl('q'));
        assert!(app.should_quit());
        app.finish()?;

        let delivered = transport.delivered.lock();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].trigger, SaveTrigger::Unload);
        assert_eq!(delivered[0].csrf_token.as_deref(), Some("token"));
        assert_eq!(
            delivered[0].note,
            Note::new("Groceries", vec![Item::new("milk", false), Item::new("eggs", true)])
        );
        Ok(())
    }

    #[test]
    fn backspace_edits_text_before_merging_rows() -> Result<()> {
        let (mut app, _) = app_with(Note::new("T", vec![Item::new("ab", false), Item::new("c", false)]))?;
        app.handle_key(press(KeyCode::Down));
        app.handle_key(press(KeyCode::Backspace));
        assert_eq!(app.editor().live_rows().len(), 2);
        app.handle_key(press(KeyCode::Backspace));
        assert_eq!(app.editor().live_rows().len(), 1);
        assert_eq!(app.editor().read_state().items, vec![Item::new("ab", false)]);
        assert_eq!(app.editor().surface().caret(), Some(2));
        app.finish()?;
        Ok(())
    }

    #[test]
    fn moving_between_rows_does_not_leave_editor() -> Result<()> {
        let (mut app, _) = app_with(Note::new("T", vec![Item::new("a", false), Item::new("b", false)]))?;
        app.handle_key(press(KeyCode::Down));
        assert!(!app.editor().has_pending_blur());
        let second = app.editor().live_rows()[1];
        assert_eq!(app.editor().surface().focused_row(), Some(second));
        app.handle_key(press(KeyCode::Esc));
        assert!(app.editor().has_pending_blur());
        assert_eq!(app.editor().surface().focused_row(), None);
        app.handle_key(press(KeyCode::Enter));
        assert_eq!(app.editor().surface().focused_row(), Some(second));
        assert!(!app.editor().has_pending_blur());
        app.finish()?;
        Ok(())
    }

    #[test]
    fn theme_toggle_is_local_only() -> Result<()> {
        let (mut app, transport) = app_with(Note::blank("T"))?;
        assert_eq!(app.theme(), ThemeName::Dark);
        app.handle_key(ctrl('t'));
        assert_eq!(app.theme(), ThemeName::Light);
        app.finish()?;
        let delivered = transport.delivered.lock();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].trigger, SaveTrigger::Unload);
        Ok(())
    }

    #[test]
    fn teardown_without_quit_still_sends_unload() -> Result<()> {
        let (mut app, transport) = app_with(Note::blank("T"))?;
        for ch in "milk".chars() {
            app.handle_key(press(KeyCode::Char(ch)));
        }
        assert!(!app.should_quit());

        app.finish()?;

        let delivered = transport.delivered.lock();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].trigger, SaveTrigger::Unload);
        assert_eq!(delivered[0].note.items, vec![Item::new("milk", false)]);
        Ok(())
    }

    #[test]
    fn key_presses_from_a_source_drive_the_loop() -> Result<()> {
        let (mut app, transport) = app_with(Note::blank("Groceries"))?;
        let mut keys = ScriptedEvents::new(
            "tea"
                .chars()
                .map(|ch| press(KeyCode::Char(ch)))
                .chain([press(KeyCode::Enter), ctrl('x'), ctrl('q')]),
        );
        let mut frames = 0;

        app.drive(&mut keys, |_| {
            frames += 1;
            Ok(())
        })?;

        assert!(app.should_quit());
        assert_eq!(keys.remaining(), 0);
        assert_eq!(frames, 7);
        app.finish()?;
        let delivered = transport.delivered.lock();
        assert_eq!(delivered.len(), 1);
        assert_eq!(
            delivered[0].note.items,
            vec![Item::new("tea", false), Item::new("", true)]
        );
        Ok(())
    }

    #[test]
    fn exhausted_source_unloads_with_latest_state() -> Result<()> {
        let (mut app, transport) = app_with(Note::new("T", vec![Item::new("A", false), Item::new("B", true)]))?;
        let rows = app.editor().live_rows();
        let mut source = ScriptedEvents::new([
            UiEvent::KeyDown {
                row: rows[0],
                key: Key::Named(NamedKey::Enter),
            },
            UiEvent::CheckboxToggled { row: rows[1] },
        ]);
        app.drive(&mut source, |_| Ok(()))?;
        assert!(app.should_quit());
        let events = app.finish()?;

        assert_eq!(events.len(), 1);
        let delivered = transport.delivered.lock();
        assert_eq!(delivered.len(), 1);
        assert_eq!(
            delivered[0].note.items,
            vec![Item::new("A", false), Item::empty(), Item::new("B", false)]
        );
        Ok(())
    }

    #[test]
    fn save_outcomes_reach_the_status_line() -> Result<()> {
        let (mut app, _) = app_with(Note::blank("T"))?;
        app.handle_save_event(SaveEvent::Failed {
            trigger: SaveTrigger::Blur,
            message: "HTTP 500".into(),
        });
        assert_eq!(app.status_message(), Some("Save failed (blur): HTTP 500"));
        app.finish()?;
        Ok(())
    }

    #[test]
    fn saved_status_uses_the_clock_time_zone() -> Result<()> {
        let (mut app, _) = app_with(Note::blank("T"))?;
        let timestamp = time::macros::datetime!(2025-10-08 22:15:09 UTC);
        let local = ClockFace::at(timestamp.to_offset(clock::local_now().offset()));

        app.handle_save_event(SaveEvent::Saved {
            trigger: SaveTrigger::Manual,
            items: 2,
            timestamp,
        });

        let expected = format!("Saved 2 items (manual) at {}", local.label);
        assert_eq!(app.status_message(), Some(expected.as_str()));
        app.finish()?;
        Ok(())
    }

    #[test]
    fn ctrl_shortcuts_require_focus_for_row_actions() {
        assert_eq!(translate_key(ctrl('d'), None), None);
        assert_eq!(translate_key(ctrl('s'), None), Some(Input::ManualSave));
        let row = RowId::new(3);
        assert_eq!(
            translate_key(ctrl('d'), Some(row)),
            Some(Input::Event(UiEvent::DeleteClicked { row }))
        );
        assert_eq!(translate_key(press(KeyCode::Esc), Some(row)), Some(Input::Leave(row)));
    }
}
