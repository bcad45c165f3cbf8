use std::fmt::Write as _;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;

use crate::app::App;
use crate::config::{AppConfig, SyncOptions};
use crate::model::Note;
use crate::sync::{HttpTransport, NoteTransport, SaveEvent, SaveRequest, SaveTrigger};

#[derive(Args, Debug, Clone, Default)]
pub struct EditArgs {
    /// Seed the editor from a note JSON file
    #[arg(long)]
    pub note: Option<PathBuf>,
    /// Title for the note (overrides the seed file and config default)
    #[arg(long)]
    pub title: Option<String>,
    #[command(flatten)]
    pub remote: RemoteArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct PushArgs {
    /// Note JSON file to send; reads stdin when omitted or `-`
    #[arg()]
    pub file: Option<PathBuf>,
    #[command(flatten)]
    pub remote: RemoteArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RemoteArgs {
    /// Save endpoint (overrides the config file)
    #[arg(long)]
    pub endpoint: Option<String>,
    /// CSRF token sent with every save
    #[arg(long)]
    pub csrf_token: Option<String>,
}

impl RemoteArgs {
    fn sync_options(&self, config: &AppConfig) -> SyncOptions {
        let mut options = config.sync.clone();
        if let Some(endpoint) = &self.endpoint {
            options.endpoint = endpoint.clone();
        }
        options
    }
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    /// Note JSON file to print
    #[arg()]
    pub file: PathBuf,
}

pub fn run_edit(config: Arc<AppConfig>, args: EditArgs) -> Result<()> {
    let mut note = match &args.note {
        Some(path) => read_note(path)?,
        None => Note::blank(config.default_title.clone()),
    };
    if let Some(title) = args.title {
        note.title = title;
    }

    let options = args.remote.sync_options(&config);
    let transport = HttpTransport::new(&options).context("building http client")?;
    tracing::info!(endpoint = %options.endpoint, items = note.len(), "starting editor");

    let mut app = App::new(config, &note, args.remote.csrf_token, transport)?;
    let result = app.run();
    let events = app.finish()?;
    result?;

    for event in events {
        match event {
            SaveEvent::Saved { trigger, items, .. } => {
                println!("Saved {items} item(s) on {trigger}");
            }
            SaveEvent::Failed { trigger, message } => {
                eprintln!("Save on {trigger} failed: {message}");
            }
        }
    }
    Ok(())
}

pub fn push_note(config: Arc<AppConfig>, args: PushArgs) -> Result<()> {
    let note = match args.file.as_deref() {
        Some(path) if path != Path::new("-") => read_note(path)?,
        _ => match read_stdin()? {
            Some(raw) => Note::from_json(&raw)?,
            None => bail!("no note given: pass a file or pipe JSON on stdin"),
        },
    };
    let options = args.remote.sync_options(&config);
    let transport = HttpTransport::new(&options).context("building http client")?;
    let items = note.len();
    deliver_once(&transport, note, args.remote.csrf_token)?;
    println!("Pushed {items} item(s) to {}", transport.endpoint());
    Ok(())
}

pub fn show_note(args: ShowArgs) -> Result<()> {
    let note = read_note(&args.file)?;
    print!("{}", render_checklist(&note));
    Ok(())
}

fn deliver_once<T: NoteTransport>(
    transport: &T,
    note: Note,
    csrf_token: Option<String>,
) -> Result<()> {
    let request = SaveRequest {
        note,
        csrf_token,
        trigger: SaveTrigger::Manual,
    };
    transport
        .deliver(&request)
        .context("sending note to endpoint")?;
    Ok(())
}

fn read_note(path: &Path) -> Result<Note> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading note {}", path.display()))?;
    Note::from_json(&raw).with_context(|| format!("loading note {}", path.display()))
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(Some(buf))
}

fn render_checklist(note: &Note) -> String {
    let mut out = String::new();
    let title = if note.title.is_empty() {
        "(untitled)"
    } else {
        note.title.as_str()
    };
    let _ = writeln!(out, "{title}");
    for item in &note.items {
        let mark = if item.checked { 'x' } else { ' ' };
        let line = format!("[{mark}] {}", item.text);
        let _ = writeln!(out, "{}", line.trim_end());
    }
    let _ = writeln!(out, "({} of {} done)", note.checked_count(), note.len());
    out
}
