use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use dialoguer::Confirm;
use indoc::indoc;

use evtxtract::{format_incomplete_record, EvtxExtractor, ExtractSettings, RecoveredRecord};
use log::{info, Level};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum OutputFormat {
    Xml,
    Json,
}

struct EvtxtractDump {
    input: PathBuf,
    output_format: OutputFormat,
    output: Box<dyn Write>,
    num_threads: usize,
    verbosity_level: Option<Level>,
}

impl EvtxtractDump {
    pub fn from_cli_matches(matches: &ArgMatches) -> Result<Self> {
        let input = PathBuf::from(
            matches
                .get_one::<String>("INPUT")
                .expect("This is a required argument"),
        );

        let output_format = match matches
            .get_one::<String>("output-format")
            .expect("has default")
            .as_str()
        {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Xml,
        };

        let num_threads: usize = *matches.get_one("num-threads").expect("has default");

        let verbosity_level = match matches.get_count("verbose") {
            0 => None,
            1 => Some(Level::Info),
            2 => Some(Level::Debug),
            _ => Some(Level::Trace),
        };

        let output: Box<dyn Write> = match matches.get_one::<String>("output-target") {
            Some(path) => Box::new(BufWriter::new(Self::create_output_file(
                path,
                !matches.get_flag("no-confirm-overwrite"),
            )?)),
            None => Box::new(BufWriter::new(io::stdout())),
        };

        Ok(EvtxtractDump {
            input,
            output_format,
            output,
            num_threads,
            verbosity_level,
        })
    }

    /// If `prompt` is true, the user will be prompted before overwriting an
    /// existing file.
    fn create_output_file(path: impl AsRef<Path>, prompt: bool) -> Result<File> {
        let path = path.as_ref();

        if path.is_dir() {
            bail!(
                "There is a directory at {}, refusing to overwrite",
                path.display()
            );
        }

        if path.exists() && prompt {
            let confirmed = Confirm::new()
                .with_prompt(format!(
                    "Are you sure you want to override output file at {}",
                    path.display()
                ))
                .default(false)
                .interact()?;

            if !confirmed {
                bail!("Aborted by user");
            }
        }

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory at {}", parent.display()))?;
            }
        }

        File::create(path).with_context(|| format!("Failed to create file at {}", path.display()))
    }

    pub fn run(&mut self) -> Result<()> {
        self.try_to_initialize_logging();

        let buf = fs::read(&self.input)
            .with_context(|| format!("Failed to read input file {}", self.input.display()))?;

        let extractor = EvtxExtractor::from_buffer(&buf)
            .with_configuration(ExtractSettings::new().num_threads(self.num_threads));

        let mut num_complete = 0u64;
        let mut num_incomplete = 0u64;

        for record in extractor.records() {
            match &record {
                RecoveredRecord::Complete(complete) => {
                    num_complete += 1;

                    match self.output_format {
                        OutputFormat::Xml => writeln!(self.output, "{}", complete.xml)?,
                        OutputFormat::Json => {
                            serde_json::to_writer(&mut self.output, &record)?;
                            writeln!(self.output)?;
                        }
                    }
                }
                RecoveredRecord::Incomplete(incomplete) => {
                    num_incomplete += 1;

                    match self.output_format {
                        OutputFormat::Xml => {
                            writeln!(self.output, "{}", format_incomplete_record(incomplete))?
                        }
                        OutputFormat::Json => {
                            serde_json::to_writer(&mut self.output, &record)?;
                            writeln!(self.output)?;
                        }
                    }
                }
            }
        }

        self.output.flush().context("Failed to flush output")?;

        info!("recovered {} complete records", num_complete);
        info!("recovered {} incomplete records", num_incomplete);

        Ok(())
    }

    fn try_to_initialize_logging(&self) {
        if let Some(level) = self.verbosity_level {
            if let Err(e) = TermLogger::init(
                level.to_level_filter(),
                Config::default(),
                TerminalMode::Stderr,
                ColorChoice::Auto,
            ) {
                eprintln!("Failed to initialize logging: {e}");
            }
        }
    }
}

fn main() -> Result<()> {
    let matches = Command::new("evtxtract_dump")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Reconstructs EVTX event log records from binary data")
        .arg(Arg::new("INPUT").required(true).help(
            "The binary input (a disk image, memory dump, or damaged evtx file) to carve",
        ))
        .arg(
            Arg::new("num-threads")
                .short('t')
                .long("threads")
                .default_value("0")
                .value_parser(clap::value_parser!(usize))
                .help("The number of threads used to validate chunk candidates, 0 means a thread per core"),
        )
        .arg(
            Arg::new("output-format")
                .short('o')
                .long("format")
                .value_parser(["xml", "json"])
                .default_value("xml")
                .help("Sets the output format"),
        )
        .arg(
            Arg::new("output-target")
                .long("output")
                .short('f')
                .action(ArgAction::Set)
                .help("Writes output to the file specified instead of stdout, asks before overwriting"),
        )
        .arg(
            Arg::new("no-confirm-overwrite")
                .long("no-confirm-overwrite")
                .action(ArgAction::SetTrue)
                .help("When set, will not ask for confirmation before overwriting files, useful for automation"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .action(ArgAction::Count)
                .help(indoc!(
                    r#"
            Sets debug prints level for the application:
                -v   - info
                -vv  - debug
                -vvv - trace
            NOTE: trace output is only available in debug builds, as it is extremely verbose."#
                )),
        )
        .get_matches();

    let mut app = EvtxtractDump::from_cli_matches(&matches)?;
    app.run()
}
