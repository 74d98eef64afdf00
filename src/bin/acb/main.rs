//! ACB CLI - Tool for inspecting and editing ACB cue sheets.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use acb::acb::{
    CommandArgs, CueSheet, ExtractOptions, HashStatus, LinkNode, LoadOptions, Reference, SequenceNode, SynthNode,
    TableKind, TrackNode, Visit, Visitor, WaveformNode, LOOP_INDEFINITE,
};
use acb::codec::EncodeType;
use acb::utf::dump;

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect, extract and edit ACB cue sheets")]
struct Cli {
    /// Debug output
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Warnings only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show header info and the cue graph
    #[command(alias = "i")]
    Info(Input),
    /// Dump the header table (or one sub-table) as JSON
    #[command(alias = "d")]
    Dump {
        #[command(flatten)]
        input: Input,
        /// Sub-table to dump, e.g. `Cue` or `Waveform`
        #[arg(long)]
        table: Option<String>,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write waveform payloads to a directory
    #[command(alias = "x")]
    Extract {
        #[command(flatten)]
        input: Input,
        /// Output directory
        #[arg(short, long)]
        output: PathBuf,
        /// Name files by cue and track path instead of archive id
        #[arg(long)]
        by_cue: bool,
        /// ADX key code used to decrypt encrypted payloads
        #[arg(long)]
        key: Option<u64>,
    },
    /// Replace the payload of one archive entry
    ReplaceWaveform {
        #[command(flatten)]
        input: Input,
        /// Archive entry id
        #[arg(long)]
        id: u64,
        /// Entry lives in the companion archive
        #[arg(long)]
        streaming: bool,
        /// New payload file
        #[arg(long)]
        payload: PathBuf,
        /// Encoding of the new payload (name or number)
        #[arg(long, value_parser = parse_encode_type, default_value = "hca")]
        encode_type: EncodeType,
        #[command(flatten)]
        out: Output,
    },
    /// Add a payload with a one-track cue
    AddCue {
        #[command(flatten)]
        input: Input,
        /// Payload file
        #[arg(long)]
        payload: PathBuf,
        /// Store the payload in the companion archive
        #[arg(long)]
        streaming: bool,
        /// Encoding of the payload (name or number)
        #[arg(long, value_parser = parse_encode_type, default_value = "hca")]
        encode_type: EncodeType,
        /// Cue name (defaults to `Cue{id}`)
        #[arg(long)]
        name: Option<String>,
        /// Cue id (defaults to the next free id)
        #[arg(long)]
        cue_id: Option<u64>,
        #[command(flatten)]
        out: Output,
    },
}

#[derive(Args, Debug)]
struct Input {
    /// Cue sheet (.acb)
    acb: PathBuf,
    /// Companion archive (.awb)
    #[arg(long)]
    awb: Option<PathBuf>,
    /// Do not check the stored companion archive hash
    #[arg(long)]
    no_verify: bool,
}

impl Input {
    fn open(&self) -> Result<CueSheet> {
        info!(path = %self.acb.display(), "opening cue sheet");
        let options = LoadOptions { verify_hash: !self.no_verify };
        CueSheet::open(&self.acb, self.awb.as_deref(), &options)
            .with_context(|| format!("failed to open {}", self.acb.display()))
    }
}

#[derive(Args, Debug)]
struct Output {
    /// Output cue sheet (defaults to overwriting the input)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Output companion archive (defaults to overwriting `--awb`)
    #[arg(long)]
    output_awb: Option<PathBuf>,
}

impl Output {
    fn save(&self, sheet: &CueSheet, input: &Input) -> Result<()> {
        let acb = self.output.as_deref().unwrap_or(input.acb.as_path());
        let awb = self.output_awb.as_deref().or(input.awb.as_deref());
        let awb = awb.filter(|_| sheet.stream_archive().is_some());
        sheet.save(acb, awb).with_context(|| format!("failed to write {}", acb.display()))
    }
}

fn parse_encode_type(s: &str) -> std::result::Result<EncodeType, String> {
    match s.to_ascii_lowercase().as_str() {
        "adx" => Ok(EncodeType::ADX),
        "hca" => Ok(EncodeType::HCA),
        "adx2" => Ok(EncodeType::ADX2),
        "hca-mx" | "hcamx" => Ok(EncodeType::HCA_MX),
        other => other
            .parse::<u8>()
            .map(EncodeType)
            .map_err(|_| format!("unknown encoding '{}': use adx, hca, hca-mx or a number", s)),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    match cli.cmd {
        Command::Info(input) => cmd_info(&input),
        Command::Dump { input, table, output } => cmd_dump(&input, table.as_deref(), output.as_deref()),
        Command::Extract { input, output, by_cue, key } => {
            let sheet = input.open()?;
            let options = ExtractOptions { name_by_cue: by_cue, key_code: key };
            let written = sheet.extract(&output, &options)?;
            println!("Extracted {} files to {}", written.len(), output.display());
            Ok(())
        }
        Command::ReplaceWaveform { input, id, streaming, payload, encode_type, out } => {
            let mut sheet = input.open()?;
            let bytes = read(&payload)?;
            sheet.replace_waveform(id, streaming, bytes, encode_type)?;
            out.save(&sheet, &input)?;
            println!("Replaced archive entry {} ({})", id, encode_type);
            Ok(())
        }
        Command::AddCue { input, payload, streaming, encode_type, name, cue_id, out } => {
            let mut sheet = input.open()?;
            let bytes = read(&payload)?;
            let (id, _) = sheet.add_waveform_and_cue(streaming, bytes, encode_type, name.as_deref(), cue_id, None)?;
            out.save(&sheet, &input)?;
            println!("Added cue {}", id);
            Ok(())
        }
    }
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

// ============================================================================
// dump
// ============================================================================

fn cmd_dump(input: &Input, table: Option<&str>, output: Option<&Path>) -> Result<()> {
    let sheet = input.open()?;
    let json = match table {
        None => dump::to_json(sheet.header()),
        Some(name) => {
            let Some(kind) = TABLE_KINDS.iter().find(|k| k.name().eq_ignore_ascii_case(name)) else {
                bail!("unknown table '{}'", name);
            };
            dump::to_json(sheet.table(*kind)?)
        }
    };
    let text = serde_json::to_string_pretty(&json)?;
    match output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
            debug!(path = %path.display(), "wrote dump");
        }
        None => println!("{}", text),
    }
    Ok(())
}

const TABLE_KINDS: [TableKind; 15] = [
    TableKind::Cue,
    TableKind::CueName,
    TableKind::Waveform,
    TableKind::Synth,
    TableKind::Track,
    TableKind::Sequence,
    TableKind::OutsideLink,
    TableKind::StringValue,
    TableKind::WaveformExtensionData,
    TableKind::GlobalAisacReference,
    TableKind::AcfReference,
    TableKind::TrackEvent,
    TableKind::TrackCommand,
    TableKind::SynthCommand,
    TableKind::SeqCommand,
];

// ============================================================================
// info
// ============================================================================

fn cmd_info(input: &Input) -> Result<()> {
    let sheet = input.open()?;

    println!("Cue sheet: {}", input.acb.display());
    println!("Name:      {}", sheet.name()?.unwrap_or_default());
    println!("Version:   {}", sheet.version_string()?);
    println!("Layout:    {:?} commands, {:?} waveform ids", sheet.command_layout(), sheet.id_scheme());
    match sheet.hash_status() {
        HashStatus::NotChecked => {}
        HashStatus::Missing => println!("Stream hash: not stored"),
        HashStatus::Match => println!("Stream hash: ok"),
        HashStatus::Mismatch { .. } => println!("Stream hash: MISMATCH"),
    }
    if let Some(archive) = sheet.memory_archive() {
        println!("Memory archive: {} entries", archive.len());
    }
    if let Some(archive) = sheet.stream_archive() {
        println!("Stream archive: {} entries", archive.len());
    }
    println!();

    println!("Tables:");
    for kind in TABLE_KINDS {
        if let Some(table) = sheet.table_opt(kind) {
            println!("  {:<24} {} rows", kind.name(), table.row_count());
        }
    }
    println!();

    let mut printer = Printer { sheet: &sheet, categories: sheet.acf_categories().unwrap_or_default() };
    let cues = sheet.cues()?;
    println!("Cues ({}):", cues.len());
    for cue in &cues {
        println!(
            "  [{}] {} ({} ms) -> {}",
            cue.id,
            cue.name.as_deref().unwrap_or("<unnamed>"),
            cue.length,
            cue.reference
        );
        sheet.walk_cue(cue.id, &mut printer)?;
    }
    Ok(())
}

/// Prints the cue graph, one node per line.
struct Printer<'a> {
    sheet: &'a CueSheet,
    categories: std::collections::BTreeMap<u64, String>,
}

impl Printer<'_> {
    fn line(&self, at: &Visit, text: impl std::fmt::Display) {
        println!("{}{}", "  ".repeat(at.depth + 2), text);
    }

    fn commands(&self, at: &Visit, commands: &[acb::acb::Command]) {
        for command in commands.iter().filter(|c| !matches!(c.args(), CommandArgs::Null)) {
            self.line(at, format!("  {}", self.describe(command)));
        }
    }

    fn describe(&self, command: &acb::acb::Command) -> String {
        match command.args() {
            CommandArgs::Category { category_id, .. } => match self.categories.get(&(category_id as u64)) {
                Some(name) => format!("Category {} ({})", category_id, name),
                None => format!("Category {}", category_id),
            },
            CommandArgs::VolumeBus { bus_name_index, volume } => {
                let bus = self.sheet.string_value(bus_name_index as u64).ok().flatten().unwrap_or_default();
                format!("VolumeBus {} = {:.2}", bus, volume as f32 / 10000.0)
            }
            CommandArgs::LoopStart { loop_id, count } if count == LOOP_INDEFINITE => {
                format!("LoopStart {} (forever)", loop_id)
            }
            CommandArgs::Delay { millis } => format!("Delay {} ms", millis),
            _ => command.to_string(),
        }
    }
}

impl Visitor for Printer<'_> {
    fn waveform(&mut self, at: &Visit, node: &WaveformNode<'_>) -> acb::Result<()> {
        let source = if node.streaming { "stream" } else { "memory" };
        let mut text = format!(
            "Waveform[{}] {} {}-{} {} ch {} Hz {} samples",
            node.row, node.encode_type, source, node.awb_id, node.channel_count, node.sample_rate, node.sample_count
        );
        if let Some(lp) = node.loop_points {
            text.push_str(&format!(" loop {}..{}", lp.start, lp.end));
        }
        if node.payload.is_none() {
            text.push_str(" (no payload)");
        }
        self.line(at, text);
        Ok(())
    }

    fn synth(&mut self, at: &Visit, node: &SynthNode) -> acb::Result<()> {
        self.line(at, format!("Synth[{}] {} children", node.row, node.children.len()));
        self.commands(at, &node.commands);
        Ok(())
    }

    fn sequence(&mut self, at: &Visit, node: &SequenceNode) -> acb::Result<()> {
        let kind = node.sequence_type.map_or("?", |t| t.name());
        self.line(at, format!("Sequence[{}] {} {} tracks", node.row, kind, node.tracks.len()));
        self.commands(at, &node.commands);
        for name in &node.global_aisacs {
            self.line(at, format!("  GlobalAisac {}", name));
        }
        Ok(())
    }

    fn track(&mut self, at: &Visit, node: &TrackNode) -> acb::Result<()> {
        self.line(at, format!("Track[{}]{}", node.row, at.path_suffix()));
        self.commands(at, &node.commands);
        Ok(())
    }

    fn event(&mut self, at: &Visit, command: &acb::acb::Command) -> acb::Result<()> {
        if !matches!(command.args(), CommandArgs::Null) {
            self.line(at, format!("  event {}", self.describe(command)));
        }
        Ok(())
    }

    fn linked_cue(&mut self, at: &Visit, link: &LinkNode) -> acb::Result<()> {
        self.line(at, format!("LinkedCue[{}] -> external cue {}", link.row, link.cue_id));
        Ok(())
    }

    fn unsupported(&mut self, at: &Visit, reference: Reference) -> acb::Result<()> {
        self.line(at, format!("{} (not followed)", reference));
        Ok(())
    }

    fn command_error(&mut self, at: &Visit, error: &acb::Error) -> acb::Result<()> {
        self.line(at, format!("  bad command stream: {}", error));
        Ok(())
    }

    fn reference_error(&mut self, at: &Visit, error: &acb::Error) -> acb::Result<()> {
        self.line(at, format!("  bad reference: {}", error));
        Ok(())
    }
}
