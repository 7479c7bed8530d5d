mod desktop;
mod sources;

use std::env;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use nearby_core::entity::{PROFILE_CATEGORY, URGENT_CATEGORY};
use nearby_core::error::{MonitorError, PreferenceError};
use nearby_core::feed::FileFeed;
use nearby_core::geo::format_radius;
use nearby_core::monitor::{FixReport, RunOptions, StopReason};
use nearby_core::notify::{Alert, MessageLevel, Notifier, ToastSink, Urgency};
use nearby_core::prefs::{JsonPreferenceStore, PreferenceStore, RADIUS_PRESETS_MILES};
use nearby_core::store::CandidateStore;
use nearby_core::{
    format_distance, AlertPreferences, AlertRecord, Config, Monitor, PositionSource,
    PositionSourceConfig, ResourceCategory,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::sources::{JsonlSource, SimulatedWalk};

#[derive(Parser, Debug)]
#[command(name = "nearby", about = "Proximity alerts for nearby needs and resources")]
struct Cli {
    /// Path to config.json
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the position stream and raise alerts (default)
    Watch {
        /// Terminal output only, even when desktop notifications work
        #[arg(long)]
        no_desktop: bool,
    },
    /// Show or change saved alert preferences
    Settings(SettingsArgs),
}

#[derive(Args, Debug, Default)]
struct SettingsArgs {
    #[arg(long, conflicts_with = "disable")]
    enable: bool,
    #[arg(long)]
    disable: bool,
    /// Alert radius in miles
    #[arg(long)]
    radius: Option<f64>,
    /// Flip a category on or off (profile, urgent or a resource type)
    #[arg(long, num_args = 1..)]
    toggle: Vec<String>,
    /// Alert for everything in range when no category is selected
    #[arg(long)]
    radius_only: Option<bool>,
    /// List known categories and radius presets
    #[arg(long)]
    list: bool,
}

fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut cfg = Config::load(&cli.config)?;
    cfg.apply_env_overrides();
    cfg.validate()?;

    let prefs_store = JsonPreferenceStore::new(expand_tilde(&cfg.preferences_path));
    match cli.command.unwrap_or(Command::Watch { no_desktop: false }) {
        Command::Watch { no_desktop } => watch(&cfg, &prefs_store, no_desktop),
        Command::Settings(args) => settings(&prefs_store, &args),
    }
}

fn watch(cfg: &Config, prefs_store: &JsonPreferenceStore, no_desktop: bool) -> io::Result<()> {
    let prefs = prefs_store.load().map_err(other)?;
    let feed = FileFeed::new(expand_tilde(&cfg.feed_path), cfg.secret()?);
    let feed_path = feed.path().to_path_buf();
    let store = CandidateStore::new(Box::new(feed));

    let mut notifier = Notifier::new(Box::new(TerminalToast)).with_link_base(cfg.link_base_url.clone());
    if !no_desktop {
        if let Some(sink) = desktop::desktop_sink() {
            notifier = notifier.with_os_sink(sink);
        }
    }

    let output_path = expand_tilde(&cfg.output_path);
    println!("nearby running");
    println!("  feed:       {}", feed_path.display());
    println!("  desktop:    {:?}", notifier.os_permission());
    println!("  radius:     {}", format_radius(prefs.radius_miles));
    println!("  categories: {}", category_list(&prefs));
    println!("  refresh:    {}s", cfg.refresh_interval_seconds);
    println!("  output:     {}", output_path.display());

    let mut source = position_source(&cfg.position_source);
    let mut monitor = Monitor::new(prefs, store, notifier);
    let handle = match monitor.start(source.as_mut()) {
        Ok(handle) => handle,
        Err(err) => {
            // The notifier has already told the user why.
            info!("not watching: {err}");
            std::process::exit(1);
        }
    };

    let (tx, rx) = mpsc::channel::<AlertRecord>();
    let writer_handle = thread::spawn(move || writer_thread(output_path, rx));

    let opts = RunOptions {
        refresh_interval: Duration::from_secs(cfg.refresh_interval_seconds),
        max_runtime: cfg.max_runtime_seconds.map(Duration::from_secs),
    };
    let result = monitor.run(
        handle,
        opts,
        Some(prefs_store as &dyn PreferenceStore),
        &mut |report: &FixReport<'_>| {
            for fired in report.fired {
                if tx.send(AlertRecord::from_fired(fired, report.fix)).is_err() {
                    warn!("alert log writer is gone");
                }
            }
            if !report.fired.is_empty() {
                for nearby in report.nearby {
                    println!(
                        "     {} ({}) {}",
                        nearby.entity.display_name(),
                        nearby.category,
                        format_distance(nearby.distance_miles)
                    );
                }
            }
        },
    );

    let status = monitor.store().status();
    let failures = monitor.store().consecutive_failures();
    drop(monitor);
    drop(tx);
    let _ = writer_handle.join();

    match result {
        Ok(StopReason::SourceClosed) => println!("[ok] position stream ended"),
        Ok(StopReason::Disabled) => println!("[ok] alerts turned off in settings"),
        Ok(StopReason::Deadline) => println!("[ok] max runtime reached"),
        Err(err) => {
            if let Some(text) = exit_message(&err) {
                eprintln!("[!!] {}", text);
            }
            std::process::exit(2);
        }
    }
    if failures > 0 {
        eprintln!("[!!] feed {:?}, {} failed refreshes in a row", status, failures);
    }
    Ok(())
}

/// Location errors were already shown through the toast sink.
fn exit_message(err: &MonitorError) -> Option<String> {
    match err {
        MonitorError::LocationUnavailable(cause) => {
            info!("location error: {cause}");
            None
        }
        other => Some(other.to_string()),
    }
}

fn settings(store: &JsonPreferenceStore, args: &SettingsArgs) -> io::Result<()> {
    if args.list {
        print_catalog();
        return Ok(());
    }

    let mut prefs = store.load().map_err(other)?;
    let changed = match apply_settings(&mut prefs, args) {
        Ok(changed) => changed,
        Err(msg) => {
            eprintln!("[!!] {}", msg);
            std::process::exit(1);
        }
    };
    if changed {
        store.save(&prefs).map_err(other)?;
        println!("saved:       {}", store.path().display());
    }

    println!("alerts:      {}", if prefs.enabled { "on" } else { "off" });
    println!("radius:      {}", format_radius(prefs.radius_miles));
    println!("categories:  {}", category_list(&prefs));
    if prefs.radius_only {
        println!("radius only: yes");
    }
    Ok(())
}

/// Returns whether anything changed. Enabling with nothing selected is
/// refused but other edits still stick.
fn apply_settings(prefs: &mut AlertPreferences, args: &SettingsArgs) -> Result<bool, String> {
    for name in &args.toggle {
        if !is_known_category(name) {
            return Err(format!("unknown category '{}', see --list", name));
        }
    }

    let before = prefs.clone();
    for name in &args.toggle {
        prefs.toggle_category(name);
    }
    if let Some(miles) = args.radius {
        if !miles.is_finite() || miles <= 0.0 {
            return Err(PreferenceError::InvalidRadius.to_string());
        }
        *prefs = prefs.clone().with_radius(miles);
    }
    if let Some(radius_only) = args.radius_only {
        prefs.radius_only = radius_only;
    }
    if args.disable {
        prefs.enabled = false;
    }
    if args.enable {
        prefs.enabled = true;
        if let Err(err) = prefs.validate() {
            prefs.enabled = false;
            eprintln!("[!!] {}", err);
        }
    }
    Ok(*prefs != before)
}

fn is_known_category(name: &str) -> bool {
    name == PROFILE_CATEGORY || name == URGENT_CATEGORY || ResourceCategory::is_resource_category(name)
}

fn category_list(prefs: &AlertPreferences) -> String {
    if prefs.enabled_categories.is_empty() {
        return if prefs.radius_only {
            "(everything in range)".to_string()
        } else {
            "(none)".to_string()
        };
    }
    prefs
        .enabled_categories
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_catalog() {
    println!("categories:");
    println!("  {:<18} People in need", PROFILE_CATEGORY);
    println!("  {:<18} Urgent needs", URGENT_CATEGORY);
    for category in ResourceCategory::ALL {
        if category != ResourceCategory::Other {
            println!("  {:<18} {}", category.as_str(), category.label());
        }
    }
    let presets: Vec<String> = RADIUS_PRESETS_MILES.iter().map(|m| format_radius(*m)).collect();
    println!("radius presets: {}", presets.join(", "));
}

fn position_source(cfg: &PositionSourceConfig) -> Box<dyn PositionSource> {
    match cfg {
        PositionSourceConfig::Jsonl { path } => Box::new(JsonlSource::new(expand_tilde(path).display().to_string())),
        PositionSourceConfig::Simulate {
            start,
            step_miles,
            interval_ms,
            steps,
        } => Box::new(SimulatedWalk::new(
            *start,
            *step_miles,
            Duration::from_millis(*interval_ms),
            *steps,
        )),
    }
}

struct TerminalToast;

impl ToastSink for TerminalToast {
    fn toast(&mut self, alert: &Alert) {
        let marker = match alert.urgency {
            Urgency::Urgent => "[!!]",
            Urgency::Normal => "[!]",
        };
        println!("{} {}: {}", marker, alert.title, alert.body);
        println!("     {}", alert.link);
    }

    fn message(&mut self, level: MessageLevel, text: &str) {
        match level {
            MessageLevel::Error => eprintln!("[!!] {}", text),
            MessageLevel::Success => println!("[ok] {}", text),
            MessageLevel::Info => println!("[..] {}", text),
        }
    }
}

fn other<E: std::error::Error + Send + Sync + 'static>(err: E) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err)
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}

fn writer_thread(path: PathBuf, rx: mpsc::Receiver<AlertRecord>) {
    if let Some(parent) = path.parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            eprintln!("[!!] failed to create log dir: {}", err);
            return;
        }
    }
    let file = match File::options().create(true).append(true).open(&path) {
        Ok(f) => f,
        Err(err) => {
            eprintln!("[!!] failed to open alert log: {}", err);
            return;
        }
    };
    let mut writer = BufWriter::new(file);

    for rec in rx {
        if let Err(err) = serde_json::to_writer(&mut writer, &rec) {
            eprintln!("[!!] alert log write failed: {}", err);
            continue;
        }
        if let Err(err) = writer.write_all(b"\n") {
            eprintln!("[!!] alert log write failed: {}", err);
            continue;
        }
        if let Err(err) = writer.flush() {
            eprintln!("[!!] alert log flush failed: {}", err);
        }
    }
}
