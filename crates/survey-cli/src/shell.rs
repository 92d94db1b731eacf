use std::fmt::Write as _;
use std::io::{self, BufRead, Write};

use clap::ValueEnum;
use serde_json::{Number, Value};
use tracing::debug;

use survey_session::{Applied, Clock, PersistenceGateway, Session, SubmitOutcome};
use survey_spec::{FieldSpec, FieldType, SectionKey, render_json_ui, render_text};

pub const HELP: &str = "\
Commands:
  show                          redraw the current section
  next | prev                   move between sections
  goto <page> <section>         jump to a section (1-based)
  set <field> <value>           answer a field (blank clears it)
  exclude <field> | skip <field>
                                toggle a field of the current section
  exclude-section | skip-section
                                toggle the current section
  add <group>                   append a blank entry
  remove <group> <index>        drop an entry
  entry <group> <index> <sub> <value>
                                answer a sub-field of an entry
  save                          save the draft now
  submit                        validate everything and archive
  reset                         discard all answers
  help | quit";

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Controls which bits of state the shell prints.
#[derive(Copy, Clone, Eq, PartialEq)]
pub enum Verbosity {
    Clean,
    /// Also print parse hints and the CBOR encoding of submissions.
    Verbose,
}

impl Verbosity {
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Clean
        }
    }

    pub fn is_verbose(&self) -> bool {
        matches!(self, Verbosity::Verbose)
    }
}

/// One line of shell input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Show,
    Help,
    Next,
    Prev,
    Goto(SectionKey),
    Set { field: String, raw: String },
    Exclude(String),
    Skip(String),
    ExcludeSection,
    SkipSection,
    Add(String),
    Remove { group: String, index: usize },
    Entry {
        group: String,
        index: usize,
        sub: String,
        raw: String,
    },
    Save,
    Submit,
    Reset,
    Quit,
}

/// Input the shell could not turn into a command or value.
#[derive(Debug, PartialEq, Eq)]
pub struct InputError {
    pub user_message: String,
    pub debug_message: Option<String>,
}

impl InputError {
    pub fn new(user_message: impl Into<String>, debug_message: Option<String>) -> Self {
        Self {
            user_message: user_message.into(),
            debug_message,
        }
    }
}

pub fn parse_command(line: &str) -> Result<ShellCommand, InputError> {
    let line = line.trim();
    let (verb, rest) = line
        .split_once(char::is_whitespace)
        .map(|(verb, rest)| (verb, rest.trim()))
        .unwrap_or((line, ""));

    let command = match verb {
        "show" | "" => ShellCommand::Show,
        "help" | "?" => ShellCommand::Help,
        "next" | "n" => ShellCommand::Next,
        "prev" | "p" => ShellCommand::Prev,
        "goto" => {
            let (page, section) = two_words(rest, "goto <page> <section>")?;
            ShellCommand::Goto(SectionKey::new(
                one_based(page, "page")?,
                one_based(section, "section")?,
            ))
        }
        "set" => {
            let (field, raw) = split_word(rest, "set <field> <value>")?;
            ShellCommand::Set {
                field: field.to_string(),
                raw: raw.to_string(),
            }
        }
        "exclude" => ShellCommand::Exclude(single_word(rest, "exclude <field>")?),
        "skip" => ShellCommand::Skip(single_word(rest, "skip <field>")?),
        "exclude-section" => ShellCommand::ExcludeSection,
        "skip-section" => ShellCommand::SkipSection,
        "add" => ShellCommand::Add(single_word(rest, "add <group>")?),
        "remove" => {
            let (group, index) = two_words(rest, "remove <group> <index>")?;
            ShellCommand::Remove {
                group: group.to_string(),
                index: parse_index(index)?,
            }
        }
        "entry" => {
            let usage = "entry <group> <index> <sub> <value>";
            let (group, rest) = split_word(rest, usage)?;
            let (index, rest) = split_word(rest, usage)?;
            let (sub, raw) = split_word(rest, usage)?;
            ShellCommand::Entry {
                group: group.to_string(),
                index: parse_index(index)?,
                sub: sub.to_string(),
                raw: raw.to_string(),
            }
        }
        "save" => ShellCommand::Save,
        "submit" => ShellCommand::Submit,
        "reset" => ShellCommand::Reset,
        "quit" | "exit" | "q" => ShellCommand::Quit,
        other => {
            return Err(InputError::new(
                format!("Unknown command '{}'. Type 'help' for a list.", other),
                None,
            ));
        }
    };
    Ok(command)
}

fn usage_error(usage: &str) -> InputError {
    InputError::new(format!("Usage: {}", usage), None)
}

/// First word and the (possibly empty) remainder.
fn split_word<'a>(input: &'a str, usage: &str) -> Result<(&'a str, &'a str), InputError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(usage_error(usage));
    }
    Ok(input
        .split_once(char::is_whitespace)
        .map(|(word, rest)| (word, rest.trim()))
        .unwrap_or((input, "")))
}

fn single_word(input: &str, usage: &str) -> Result<String, InputError> {
    match split_word(input, usage)? {
        (word, "") => Ok(word.to_string()),
        _ => Err(usage_error(usage)),
    }
}

fn two_words<'a>(input: &'a str, usage: &str) -> Result<(&'a str, &'a str), InputError> {
    let (first, rest) = split_word(input, usage)?;
    match split_word(rest, usage)? {
        (second, "") => Ok((first, second)),
        _ => Err(usage_error(usage)),
    }
}

fn parse_index(raw: &str) -> Result<usize, InputError> {
    raw.parse().map_err(|_| {
        InputError::new(
            "Entry index must be a whole number.",
            Some(format!("got '{}'", raw)),
        )
    })
}

fn one_based(raw: &str, what: &str) -> Result<usize, InputError> {
    match raw.parse::<usize>() {
        Ok(number) if number > 0 => Ok(number - 1),
        _ => Err(InputError::new(
            format!("The {} number must be 1 or greater.", what),
            Some(format!("got '{}'", raw)),
        )),
    }
}

/// Converts typed text into a response value shaped for `field`.
///
/// Blank input yields the field's blank value so the answer is cleared.
pub fn parse_value(field: &FieldSpec, raw: &str) -> Result<Value, InputError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(field.blank_value());
    }
    match field.kind {
        FieldType::Number => parse_number(raw),
        FieldType::Checkbox => parse_choices(field, raw),
        FieldType::Radio | FieldType::Select => parse_choice(field, raw),
        FieldType::Group => parse_entries(field, raw),
        _ => Ok(Value::String(raw.to_string())),
    }
}

fn parse_number(raw: &str) -> Result<Value, InputError> {
    if let Ok(whole) = raw.parse::<i64>() {
        return Ok(Value::Number(Number::from(whole)));
    }
    raw.parse::<f64>()
        .map_err(|_| InputError::new("Please enter a number.", Some("expected number".into())))
        .and_then(|value| {
            Number::from_f64(value).map(Value::Number).ok_or_else(|| {
                InputError::new(
                    "Please enter a finite number.",
                    Some("number must be finite".into()),
                )
            })
        })
}

fn option_values(field: &FieldSpec) -> Vec<&str> {
    field
        .options
        .iter()
        .map(|option| option.value.as_str())
        .collect()
}

fn parse_choice(field: &FieldSpec, raw: &str) -> Result<Value, InputError> {
    let allowed = option_values(field);
    if allowed.is_empty() {
        return Ok(Value::String(raw.to_string()));
    }
    allowed
        .iter()
        .find(|choice| choice.eq_ignore_ascii_case(raw))
        .map(|choice| Value::String(choice.to_string()))
        .ok_or_else(|| {
            InputError::new(
                format!("Choose one of: {}.", allowed.join(", ")),
                Some(format!("allowed values: {}", allowed.join(", "))),
            )
        })
}

/// `a, b` or a JSON array of option values.
fn parse_choices(field: &FieldSpec, raw: &str) -> Result<Value, InputError> {
    let picked: Vec<String> = if raw.starts_with('[') {
        serde_json::from_str(raw).map_err(|err| {
            InputError::new(
                "Invalid selection; use a comma list or a JSON array of strings.",
                Some(err.to_string()),
            )
        })?
    } else {
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect()
    };
    picked
        .iter()
        .map(|item| parse_choice(field, item))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn parse_entries(field: &FieldSpec, raw: &str) -> Result<Value, InputError> {
    let sub_ids = field
        .sub_fields
        .iter()
        .map(|sub| sub.id.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(entries)) if entries.iter().all(Value::is_object) => {
            Ok(Value::Array(entries))
        }
        Ok(_) => Err(InputError::new(
            "Group answers must be a JSON array of objects.",
            Some(format!("expected entries with fields [{}]", sub_ids)),
        )),
        Err(err) => Err(InputError::new(
            "Invalid entries; provide a JSON array (e.g. [{\"field\": \"value\"}]).",
            Some(err.to_string()),
        )),
    }
}

/// Whether the loop keeps reading after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Render,
    Quiet,
    Quit,
}

/// Prints views, messages and errors for one shell run.
pub struct ShellPresenter {
    format: OutputFormat,
    verbosity: Verbosity,
}

impl ShellPresenter {
    pub fn new(format: OutputFormat, verbosity: Verbosity) -> Self {
        Self { format, verbosity }
    }

    pub fn show_view<G, C, W>(&self, session: &Session<G, C>, out: &mut W) -> io::Result<()>
    where
        G: PersistenceGateway,
        C: Clock,
        W: Write,
    {
        let Some(view) = session.view() else {
            return writeln!(out, "The questionnaire has no sections.");
        };
        match self.format {
            OutputFormat::Text => writeln!(out, "{}", render_text(&view)),
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(&render_json_ui(&view))
                    .map_err(io::Error::other)?;
                writeln!(out, "{}", json)
            }
        }
    }

    pub fn show_input_error<W: Write>(&self, error: &InputError, out: &mut W) -> io::Result<()> {
        writeln!(out, "Invalid input: {}", error.user_message)?;
        if self.verbosity.is_verbose()
            && let Some(debug) = &error.debug_message
        {
            writeln!(out, "  Expected: {}", debug)?;
        }
        Ok(())
    }

    pub fn show_submission<W: Write>(&self, outcome: &SubmitOutcome, out: &mut W) -> io::Result<()> {
        match outcome {
            SubmitOutcome::Invalid { section, errors } => {
                writeln!(
                    out,
                    "Submission blocked: {} error(s); moved to section {}.",
                    errors.len(),
                    section
                )?;
                for error in errors {
                    writeln!(out, "  {} - {}", error.path, error.message)?;
                }
            }
            SubmitOutcome::Submitted {
                submission,
                version,
            } => {
                writeln!(out, "Submitted ✅ {}", submission.file_name())?;
                if let Some(version) = version {
                    writeln!(out, "Archived as version {}", version)?;
                }
                if self.verbosity.is_verbose() {
                    match submission.to_cbor() {
                        Ok(bytes) => writeln!(out, "Answers (CBOR hex): {}", encode_hex(&bytes))?,
                        Err(err) => writeln!(out, "Failed to encode answers as CBOR: {}", err)?,
                    }
                }
            }
        }
        Ok(())
    }
}

/// Reads commands from `input` until `quit`, end of input or a successful
/// submit. The debounced save is flushed after every command.
pub fn run_shell<G, C, R, W>(
    session: &mut Session<G, C>,
    presenter: &ShellPresenter,
    input: R,
    out: &mut W,
) -> io::Result<()>
where
    G: PersistenceGateway,
    C: Clock,
    R: BufRead,
    W: Write,
{
    presenter.show_view(session, out)?;
    let mut lines = input.lines();
    loop {
        write!(out, "> ")?;
        out.flush()?;
        let Some(line) = lines.next().transpose()? else {
            writeln!(out)?;
            break;
        };
        let flow = match parse_command(&line) {
            Ok(command) => execute(session, presenter, command, out)?,
            Err(err) => {
                presenter.show_input_error(&err, out)?;
                Flow::Quiet
            }
        };
        if session.tick() {
            debug!("draft flushed");
        }
        match flow {
            Flow::Render => presenter.show_view(session, out)?,
            Flow::Quiet => {}
            Flow::Quit => break,
        }
    }
    Ok(())
}

fn execute<G, C, W>(
    session: &mut Session<G, C>,
    presenter: &ShellPresenter,
    command: ShellCommand,
    out: &mut W,
) -> io::Result<Flow>
where
    G: PersistenceGateway,
    C: Clock,
    W: Write,
{
    let outcome = match command {
        ShellCommand::Show => return Ok(Flow::Render),
        ShellCommand::Help => {
            writeln!(out, "{}", HELP)?;
            return Ok(Flow::Quiet);
        }
        ShellCommand::Quit => return Ok(Flow::Quit),
        ShellCommand::Next => {
            let movement = session.advance();
            if !movement.moved() {
                writeln!(out, "Already at the last section.")?;
            }
            return Ok(Flow::Render);
        }
        ShellCommand::Prev => {
            if !session.retreat().moved() {
                writeln!(out, "Already at the first section.")?;
            }
            return Ok(Flow::Render);
        }
        ShellCommand::Goto(key) => {
            if !session.jump(key).moved() {
                writeln!(out, "Section {} does not exist.", key)?;
                return Ok(Flow::Quiet);
            }
            return Ok(Flow::Render);
        }
        ShellCommand::Set { field, raw } => {
            let spec = session
                .questionnaire()
                .locate_top_level(&field)
                .and_then(|address| session.questionnaire().field(&address))
                .cloned();
            let Some(spec) = spec else {
                writeln!(out, "error: field '{}' not found", field)?;
                return Ok(Flow::Quiet);
            };
            match parse_value(&spec, &raw) {
                Ok(value) => session.set_response(&field, value).map(|applied| {
                    format!("{} {}", field, applied_label(applied == Applied::Stored))
                }),
                Err(err) => {
                    presenter.show_input_error(&err, out)?;
                    return Ok(Flow::Quiet);
                }
            }
        }
        ShellCommand::Exclude(field) => session
            .toggle_field_exclude(&field)
            .map(|disposition| format!("{} is now {}", field, disposition.as_str())),
        ShellCommand::Skip(field) => session
            .toggle_field_skip(&field)
            .map(|disposition| format!("{} is now {}", field, disposition.as_str())),
        ShellCommand::ExcludeSection => session
            .toggle_section_exclude()
            .map(|disposition| format!("section is now {}", disposition.as_str())),
        ShellCommand::SkipSection => session
            .toggle_section_skip()
            .map(|disposition| format!("section is now {}", disposition.as_str())),
        ShellCommand::Add(group) => session.add_entry(&group).map(|index| match index {
            Some(index) => format!("added {} entry #{}", group, index),
            None => format!("{} is not in scope; nothing added", group),
        }),
        ShellCommand::Remove { group, index } => session
            .remove_entry(&group, index)
            .map(|applied| format!("{} #{} {}", group, index, removed_label(applied))),
        ShellCommand::Entry {
            group,
            index,
            sub,
            raw,
        } => {
            let spec = session
                .questionnaire()
                .locate_top_level(&group)
                .and_then(|address| session.questionnaire().field(&address))
                .and_then(|field| field.sub_field(&sub))
                .cloned();
            let Some(spec) = spec else {
                writeln!(out, "error: field '{}' not found in group '{}'", sub, group)?;
                return Ok(Flow::Quiet);
            };
            match parse_value(&spec, &raw) {
                Ok(value) => session
                    .set_entry_value(&group, index, &sub, value)
                    .map(|applied| {
                        format!(
                            "{} #{} {} {}",
                            group,
                            index,
                            sub,
                            applied_label(applied == Applied::Stored)
                        )
                    }),
                Err(err) => {
                    presenter.show_input_error(&err, out)?;
                    return Ok(Flow::Quiet);
                }
            }
        }
        ShellCommand::Save => {
            let message = if session.save_now() {
                "Draft saved."
            } else {
                "Draft could not be saved; will retry."
            };
            writeln!(out, "{}", message)?;
            return Ok(Flow::Quiet);
        }
        ShellCommand::Reset => {
            session.reset();
            writeln!(out, "All answers cleared.")?;
            return Ok(Flow::Render);
        }
        ShellCommand::Submit => {
            return match session.submit() {
                Ok(outcome) => {
                    presenter.show_submission(&outcome, out)?;
                    Ok(match outcome {
                        SubmitOutcome::Invalid { .. } => Flow::Render,
                        SubmitOutcome::Submitted { .. } => Flow::Quit,
                    })
                }
                Err(err) => {
                    writeln!(out, "error: submission failed: {}", err)?;
                    Ok(Flow::Quiet)
                }
            };
        }
    };

    match outcome {
        Ok(message) => {
            writeln!(out, "{}", message)?;
            Ok(Flow::Render)
        }
        Err(err) => {
            writeln!(out, "error: {}", err)?;
            Ok(Flow::Quiet)
        }
    }
}

fn applied_label(stored: bool) -> &'static str {
    if stored {
        "updated"
    } else {
        "ignored (excluded or skipped)"
    }
}

fn removed_label(applied: Applied) -> &'static str {
    match applied {
        Applied::Stored => "removed",
        Applied::Ignored => "kept (group excluded or skipped)",
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(&mut encoded, "{:02x}", byte);
    }
    encoded
}
