use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use listsweep_core::config::Config;
use listsweep_core::group_code::GroupCodePolicy;
use listsweep_core::CaptureParser;
use listsweep_core::PersistedEntry;
use listsweep_core::RecordStore;
use listsweep_core::UiNode;
use listsweep_exec::run_message_sweep;
use listsweep_exec::run_session_pass;
use listsweep_exec::ReplayDriver;
use listsweep_exec::ScreenshotCropper;
use listsweep_exec::SideChannelHandler;
use listsweep_exec::SkipMedia;
use serde_json::json;

const CONFIG_FILE: &str = "config.toml";
const STORE_FILE: &str = "records.jsonl";

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_help();
        return Ok(());
    };
    let rest = args.collect::<Vec<_>>();

    match command.as_str() {
        "--help" | "-h" | "help" => {
            print_help();
            Ok(())
        }
        "--version" | "-V" | "version" => {
            println!("listsweep {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "messages" => run_messages(Options::parse(&rest)?),
        "sessions" => run_sessions(Options::parse(&rest)?),
        "inspect" => run_inspect(Options::parse(&rest)?),
        _ => {
            print_help();
            bail!("unknown command: {command}")
        }
    }
}

#[derive(Debug, Default)]
struct Options {
    captures: Option<PathBuf>,
    store: Option<PathBuf>,
    media_out: Option<PathBuf>,
    config: Option<PathBuf>,
    conversation: Option<String>,
    dump: Option<PathBuf>,
    surface: Option<String>,
}

impl Options {
    fn parse(args: &[String]) -> Result<Self> {
        let mut options = Self::default();
        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            let Some(value) = args.get(i + 1) else {
                bail!("{flag} requires a value");
            };
            match flag {
                "--captures" => options.captures = Some(PathBuf::from(value)),
                "--store" => options.store = Some(PathBuf::from(value)),
                "--media-out" => options.media_out = Some(PathBuf::from(value)),
                "--config" => options.config = Some(PathBuf::from(value)),
                "--conversation" => options.conversation = Some(value.clone()),
                "--dump" => options.dump = Some(PathBuf::from(value)),
                "--surface" => options.surface = Some(value.clone()),
                other => bail!("unsupported argument: {other}"),
            }
            i += 2;
        }
        Ok(options)
    }

    fn captures(&self) -> Result<&Path> {
        match &self.captures {
            Some(dir) => Ok(dir),
            None => bail!("--captures is required"),
        }
    }

    /// Conversation id for stored records; defaults to the capture directory name.
    fn conversation(&self) -> Result<String> {
        if let Some(name) = &self.conversation {
            return Ok(name.clone());
        }
        let dir = self.captures()?;
        Ok(dir
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("conversation")
            .to_string())
    }

    fn store_path(&self) -> PathBuf {
        self.store.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|dir| dir.join("listsweep"))
                .unwrap_or_else(|| PathBuf::from(".listsweep"))
                .join(STORE_FILE)
        })
    }
}

fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let Some(default) = dirs::config_dir().map(|dir| dir.join("listsweep").join(CONFIG_FILE))
            else {
                return Ok(Config::default());
            };
            if !default.exists() {
                return Ok(Config::default());
            }
            default
        }
    };
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: Config =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    log::debug!("loaded config from {}", path.display());
    Ok(config)
}

fn load_group_codes(config: &Config) -> Result<GroupCodePolicy> {
    let Some(path) = &config.sessions.group_code_policy else {
        return Ok(GroupCodePolicy::default());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading group-code policy {}", path.display()))?;
    let policy = GroupCodePolicy::from_yaml(&raw)
        .with_context(|| format!("parsing group-code policy {}", path.display()))?;
    log::info!("group-code policy {} v{}", policy.id, policy.version);
    Ok(policy)
}

fn run_messages(options: Options) -> Result<()> {
    let config = load_config(options.config.as_deref())?;
    let conversation = options.conversation()?;
    let mut driver = ReplayDriver::open(options.captures()?)?;
    let mut parser = CaptureParser::new(config.layout.clone());
    let mut store = RecordStore::open(options.store_path())
        .with_context(|| format!("opening store {}", options.store_path().display()))?;

    let known = store.history(&conversation)?;
    let mut handler: Box<dyn SideChannelHandler> = match &options.media_out {
        Some(dir) => Box::new(ScreenshotCropper::new(dir)),
        None => Box::new(SkipMedia),
    };
    let report = run_message_sweep(
        &mut driver,
        &mut parser,
        handler.as_mut(),
        known.clone(),
        &config.sweep,
    )?;
    let written = store.append_history(&conversation, &known, &report.history)?;
    store.save_snapshot(&store.snapshot()?)?;
    log::info!("{written} records written to {}", store.path().display());

    let output = json!({
        "conversation": conversation,
        "entries": report.history.len(),
        "written": written,
        "captures": report.captures,
        "media_saved": report.media_saved,
        "decisions": report.decisions,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run_sessions(options: Options) -> Result<()> {
    let config = load_config(options.config.as_deref())?;
    let mut driver = ReplayDriver::open(options.captures()?)?;
    let mut parser =
        CaptureParser::new(config.layout.clone()).with_group_codes(load_group_codes(&config)?);
    let mut store = RecordStore::open(options.store_path())
        .with_context(|| format!("opening store {}", options.store_path().display()))?;

    let cursor = store.latest_cursor()?;
    let report = run_session_pass(&mut driver, &mut parser, cursor, config.sessions.page_ceiling)?;
    if let (Some(opened), Some(cursor)) = (&report.opened, &report.cursor) {
        let seq = store.append(PersistedEntry::Cursor {
            cursor: cursor.clone(),
        })?;
        log::info!("cursor {:?} recorded as #{seq}", opened.name);
        store.save_snapshot(&store.snapshot()?)?;
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_inspect(options: Options) -> Result<()> {
    let Some(path) = &options.dump else {
        bail!("--dump is required");
    };
    let config = load_config(options.config.as_deref())?;
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let root: UiNode =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    let mut parser =
        CaptureParser::new(config.layout.clone()).with_group_codes(load_group_codes(&config)?);

    let encoded = match options.surface.as_deref().unwrap_or("conversation") {
        "conversation" => serde_json::to_string_pretty(&parser.parse_messages(&root, true))?,
        "sessions" => serde_json::to_string_pretty(&parser.parse_sessions(&root))?,
        other => bail!("unknown surface: {other} (expected conversation or sessions)"),
    };
    println!("{encoded}");
    Ok(())
}

fn print_help() {
    println!(
        "listsweep {}\n\n\
         Usage:\n  \
         listsweep messages --captures DIR [--store FILE] [--media-out DIR] [--conversation NAME] [--config FILE]\n  \
         listsweep sessions --captures DIR [--store FILE] [--config FILE]\n  \
         listsweep inspect --dump FILE [--surface conversation|sessions] [--config FILE]\n  \
         listsweep --help | --version\n\n\
         Captures are frame-000.json, frame-001.json, ... (optional PNG of the same stem);\n\
         frame-000 is the newest screen. Set RUST_LOG to adjust logging.",
        env!("CARGO_PKG_VERSION")
    );
}
