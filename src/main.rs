use std::{fs::{File, OpenOptions}, io::{BufWriter, Read, Seek, Write}, path::Path, process::ExitCode};

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod decode;
mod error;
mod inspect;
mod pretty;
mod progress;
mod record;
mod report;
mod sha1sum;
mod sparse;
mod stream;

use decode::{DecodeOptions, Summary};
use error::{DecodeError, Error, Result};
use report::{Reporter, Silent, TableReport, YamlReport};
use sha1sum::Sha1sum;
use stream::Sequential;

/// Destination sentinel for standard output
const STDOUT: &str = "-";

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ReportFormat {
    /// Nothing besides log messages
    None,
    /// Human-readable tables
    Table,
    /// One YAML document
    Yaml,
}

#[derive(clap::Args, Debug, Clone)]
struct Reporting {
    #[arg(short, long)]
    /// Only show the information, no data is output
    info: bool,

    #[arg(short, long, value_enum)]
    /// How to report the image structure, defaults to table when --info,
    /// none otherwise
    report: Option<ReportFormat>,

    #[arg(short, long)]
    /// Show a progress bar on stderr
    progress: bool,

    #[arg(long)]
    /// Print the SHA1 of the decoded image
    sha1: bool,

    #[arg(long, value_name = "HEX")]
    /// Fail if the SHA1 of the decoded image differs
    expect_sha1: Option<String>,
}

impl Reporting {
    fn wants_digest(&self) -> bool {
        self.sha1 || self.expect_sha1.is_some()
    }
}

#[derive(clap::Subcommand, Debug, Clone)]
enum Action {
    /// Decode a sparse image read from stdin into a file/device
    Write {
        /// Path of file/device to write blocks to, '-' for stdout, info only
        /// if omitted
        dest: Option<String>,
        #[command(flatten)]
        reporting: Reporting,
    },
    /// Decode a sparse image file to stdout
    Read {
        /// Path of sparse image to read
        source: String,
        #[command(flatten)]
        reporting: Reporting,
    },
}

#[derive(Parser, Debug)]
#[command(version)]
struct Arg {
    #[command(subcommand)]
    action: Action,

    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    /// Log more, repeat for even more, RUST_LOG overrides
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Reports go to stderr when the image itself goes to stdout
fn report_out(to_stderr: bool) -> Box<dyn Write> {
    if to_stderr {
        Box::new(std::io::stderr())
    } else {
        Box::new(std::io::stdout())
    }
}

fn reporters(reporting: &Reporting, info_only: bool, to_stderr: bool)
    -> Result<Vec<Box<dyn Reporter>>>
{
    let format = reporting.report.unwrap_or(
        if info_only { ReportFormat::Table } else { ReportFormat::None });
    let mut reporters: Vec<Box<dyn Reporter>> = Vec::new();
    match format {
        ReportFormat::None => reporters.push(Box::new(Silent)),
        ReportFormat::Table =>
            reporters.push(Box::new(TableReport::new(report_out(to_stderr)))),
        ReportFormat::Yaml =>
            reporters.push(Box::new(YamlReport::new(report_out(to_stderr)))),
    }
    if reporting.progress {
        reporters.push(Box::new(progress::ProgressReport::new()?))
    }
    Ok(reporters)
}

fn expected_sha1(reporting: &Reporting) -> Result<Option<Sha1sum>> {
    reporting.expect_sha1.as_deref().map(Sha1sum::from_hex).transpose()
}

fn conclude(
    result: std::result::Result<Summary, DecodeError>,
    mut reporters: Vec<Box<dyn Reporter>>,
    reporting: &Reporting,
    expected: Option<Sha1sum>,
    to_stderr: bool,
) -> Result<()> {
    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            if let Err(report_error) = reporters.finish(None) {
                tracing::warn!("Failed to finish report: {}", report_error)
            }
            return Err(e.into())
        }
    };
    reporters.finish(Some(&summary))?;
    tracing::info!("Decoded {} chunks in {} mode, 0x{:x} bytes of output",
        summary.chunks, summary.mode, summary.output_size);
    if let Some(sha1sum) = &summary.sha1sum {
        if reporting.sha1 {
            writeln!(report_out(to_stderr), "{}", sha1sum)?
        }
        if let Some(expected) = expected {
            if &expected != sha1sum {
                return Err(Error::Sha1Mismatch {
                    expected, calculated: sha1sum.clone() })
            }
        }
    }
    Ok(())
}

fn run<R, W>(source: R, sink: Option<W>, reporting: &Reporting, info_only: bool, to_stderr: bool)
    -> Result<()>
where
    R: Read,
    W: Write + Seek,
{
    let expected = expected_sha1(reporting)?;
    let mut reporters = reporters(reporting, info_only, to_stderr)?;
    let options = DecodeOptions {
        info_only,
        digest: reporting.wants_digest(),
    };
    let result = decode::decode(source, sink, options, &mut reporters);
    conclude(result, reporters, reporting, expected, to_stderr)
}

fn open_destination<P: AsRef<Path>>(path: P) -> Result<File> {
    let path = path.as_ref();
    // No truncation, the destination is usually a block device
    OpenOptions::new().write(true).create(true).open(path)
        .map_err(|source| Error::OpenFile { path: path.into(), source })
}

fn write(dest: Option<String>, reporting: &Reporting) -> Result<()> {
    let stdin = std::io::stdin().lock();
    match dest {
        Some(dest) if !reporting.info => if dest == STDOUT {
            let stdout = BufWriter::new(std::io::stdout().lock());
            run(stdin, Some(Sequential::new(stdout)), reporting, false, true)
        } else {
            let file = open_destination(&dest)?;
            run(stdin, Some(file), reporting, false, false)
        },
        _ => run(stdin, None::<File>, reporting, true, false),
    }
}

fn read(source: String, reporting: &Reporting) -> Result<()> {
    let file = File::open(&source)
        .map_err(|e| Error::OpenFile { path: source.into(), source: e })?;
    if !reporting.info {
        let stdout = BufWriter::new(std::io::stdout().lock());
        return run(file, Some(Sequential::new(stdout)), reporting, false, true)
    }
    if reporting.wants_digest() {
        // Digest needs every byte, walk the whole image
        return run(file, None::<File>, reporting, true, false)
    }
    let mut reporters = reporters(reporting, true, false)?;
    let result = inspect::inspect(file, &mut reporters);
    conclude(result, reporters, reporting, None, false)
}

fn main() -> ExitCode {
    let arg = Arg::parse();
    init_logging(arg.verbose);
    let result = match arg.action {
        Action::Write { dest, reporting } => write(dest, &reporting),
        Action::Read { source, reporting } => read(source, &reporting),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_consistent() {
        Arg::command().debug_assert()
    }

    #[test]
    fn write_without_dest_is_info_only() {
        let arg = Arg::try_parse_from(["unsparse", "-v", "write", "--sha1"]).unwrap();
        assert_eq!(arg.verbose, 1);
        match arg.action {
            Action::Write { dest, reporting } => {
                assert!(dest.is_none());
                assert!(reporting.wants_digest());
                assert!(!reporting.info);
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn read_with_yaml_report() {
        let arg = Arg::try_parse_from(
            ["unsparse", "read", "-i", "--report", "yaml", "system.img"]).unwrap();
        match arg.action {
            Action::Read { source, reporting } => {
                assert_eq!(source, "system.img");
                assert!(reporting.info);
                assert_eq!(reporting.report, Some(ReportFormat::Yaml));
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn bad_expected_sha1_is_rejected_before_decoding() {
        let arg = Arg::try_parse_from(
            ["unsparse", "write", "--expect-sha1", "xyz"]).unwrap();
        let Action::Write { reporting, .. } = arg.action else {
            panic!("expected write")
        };
        assert!(matches!(expected_sha1(&reporting), Err(Error::FromHexError(_))));
    }
}
