use log::{debug, info};
use snafu::prelude::*;

use std::io::BufRead;

use crate::dash::*;

const HELP: &str = "Commands:
  surveyor <name|all>     select a surveyor
  from <YYYY-MM-DD|all>   first day of the date range
  to <YYYY-MM-DD|all>     last day of the date range
  province <name|all>     select a province (resets district and village)
  district <name|all>     select a district (resets village)
  village <name|all>      select a village
  mode <cluster|sequence|route>
  show                    print the dashboard
  options                 print the choices of each filter
  keys                    list the submissions
  record <KEY>            print a submission
  note <text>             save a note about the selected surveyor
  render [path]           write the dashboard page
  reload                  read the data again
  help
  quit";

enum Flow {
    Continue,
    Quit,
}

/// An interactive session: the filters are kept between commands and the data stays loaded.
pub struct Session {
    settings: Settings,
    cache: IngestCache,
    filters: FilterArgs,
    mode: MapMode,
}

fn io(r: std::io::Result<()>) -> BDashResult<()> {
    r.context(WritingOutputSnafu { path: "session" })?;
    Ok(())
}

/// "all" and blank values clear a selection.
fn selection_arg(value: &str) -> Option<String> {
    if Selection::parse(value).is_all() {
        None
    } else {
        Some(value.trim().to_string())
    }
}

impl Session {
    pub fn new(settings: Settings, cache: IngestCache) -> Session {
        let mode = settings.map_mode;
        Session {
            settings,
            cache,
            filters: FilterArgs::default(),
            mode,
        }
    }

    pub fn run<R: BufRead, W: Write>(&mut self, input: &mut R, out: &mut W) -> BDashResult<()> {
        io(writeln!(out, "Type 'help' for the list of commands."))?;
        let mut line = String::new();
        loop {
            io(write!(out, "> "))?;
            io(out.flush())?;
            line.clear();
            let n = input.read_line(&mut line).context(ReadingInputSnafu {})?;
            if n == 0 {
                break;
            }
            match self.execute(line.trim(), out) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Quit) => break,
                // Output failures end the session, the others are reported.
                Err(e) if matches!(*e, DashError::WritingOutput { .. }) => return Err(e),
                Err(e) => io(writeln!(out, "Error: {}", e))?,
            }
        }
        info!("Session: closed");
        Ok(())
    }

    fn execute(&mut self, line: &str, out: &mut dyn Write) -> BDashResult<Flow> {
        let (cmd, arg) = match line.split_once(char::is_whitespace) {
            Some((c, a)) => (c, a.trim()),
            None => (line, ""),
        };
        debug!("Session: command {:?} {:?}", cmd, arg);
        match cmd.to_lowercase().as_str() {
            "" => {}
            "quit" | "exit" => return Ok(Flow::Quit),
            "help" => io(writeln!(out, "{}", HELP))?,
            "surveyor" => self.filters.surveyor = selection_arg(arg),
            "province" => {
                self.filters.province = selection_arg(arg);
                self.filters.district = None;
                self.filters.village = None;
            }
            "district" => {
                self.filters.district = selection_arg(arg);
                self.filters.village = None;
            }
            "village" => self.filters.village = selection_arg(arg),
            "from" | "to" => {
                let value = selection_arg(arg);
                if let Some(v) = &value {
                    // Checked now rather than at the next display.
                    NaiveDate::parse_from_str(v, "%Y-%m-%d")
                        .context(InvalidDateSnafu { value: v.as_str() })?;
                }
                if cmd.eq_ignore_ascii_case("from") {
                    self.filters.from = value;
                } else {
                    self.filters.to = value;
                }
            }
            "mode" => {
                self.mode = parse_map_mode(arg)?;
                let surveyor = Selection::parse(self.filters.surveyor.as_deref().unwrap_or(""));
                if !MapMode::available(&surveyor).contains(&self.mode) {
                    io(writeln!(
                        out,
                        "The {} map needs a surveyor; the clustered map is shown meanwhile.",
                        self.mode.name()
                    ))?;
                }
            }
            "show" => {
                if let Some(dash) = self.dashboard(out)? {
                    io(write_dashboard_text(&dash, out))?;
                }
            }
            "options" => {
                if let Some(dash) = self.dashboard(out)? {
                    io(write_options(&dash, out))?;
                }
            }
            "keys" => {
                if let Some(dash) = self.dashboard(out)? {
                    for k in dash.record_keys.iter() {
                        io(writeln!(out, "{}", k))?;
                    }
                }
            }
            "record" => {
                if let Some(loaded) = load_non_empty(&mut self.cache, &self.settings, out)? {
                    let f = build_filters(&self.filters, &loaded.dataset)?;
                    let view = FilteredView::new(&loaded.dataset, &f);
                    match lookup(&view.rows, arg) {
                        Ok(details) => {
                            for d in details.iter() {
                                io(write_record(d, out))?;
                            }
                        }
                        Err(e) => io(writeln!(out, "{}", e))?,
                    }
                }
            }
            "note" => match self.filters.surveyor.clone() {
                None => io(writeln!(out, "Select a surveyor to add notes."))?,
                Some(s) => {
                    let msg = match io_notes::append_note_now(&self.settings.notes_file, &s, arg)? {
                        io_notes::NoteOutcome::Appended => "Notes saved successfully!",
                        io_notes::NoteOutcome::Discarded => "Empty note, nothing saved.",
                    };
                    io(writeln!(out, "{}", msg))?;
                }
            },
            "render" => {
                if let Some(loaded) = load_non_empty(&mut self.cache, &self.settings, out)? {
                    let f = build_filters(&self.filters, &loaded.dataset)?;
                    let out_path = if arg.is_empty() {
                        self.settings.output_directory.join(DEFAULT_PAGE_NAME)
                    } else {
                        PathBuf::from(arg)
                    };
                    write_dashboard_page(
                        &self.settings,
                        &loaded.dataset,
                        &f,
                        self.mode,
                        None,
                        &out_path,
                    )?;
                    io(writeln!(out, "Dashboard written to {}.", out_path.display()))?;
                }
            }
            "reload" => {
                let loaded = self.cache.reload(&self.settings.source)?;
                io(writeln!(
                    out,
                    "{} submissions loaded from {}.",
                    loaded.dataset.submissions.len(),
                    self.settings.source.display()
                ))?;
            }
            other => io(writeln!(out, "Unknown command {:?}. Type 'help'.", other))?,
        }
        Ok(Flow::Continue)
    }

    fn dashboard(&mut self, out: &mut dyn Write) -> BDashResult<Option<Dashboard>> {
        let loaded = match load_non_empty(&mut self.cache, &self.settings, out)? {
            Some(l) => l,
            None => return Ok(None),
        };
        let f = build_filters(&self.filters, &loaded.dataset)?;
        let view = FilteredView::new(&loaded.dataset, &f);
        let dash = render(&view, self.mode).context(ViewSnafu {})?;
        Ok(Some(dash))
    }
}
