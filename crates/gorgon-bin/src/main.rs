//! Gorgon entrypoint: the textual front-end.
//!
//! Loads an executable image, wires the provider registry into the
//! engine, runs the analysis pipeline to completion, and prints the
//! resulting document as a listing (areas, labels, formatted cells,
//! cross-reference annotations). Document events stream to stdout as
//! they arrive, which doubles as a demonstration of the subscription
//! surface.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Once;

use anyhow::{Context, Result, bail};
use clap::Parser;
use core_address::Address;
use core_binary::BinaryStream;
use core_config::{ConfigurationModel, Settings};
use core_engine::Engine;
use core_events::{EventMask, Subscriber};
use core_plugin::ModuleManager;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "gorgon", version, about = "Interactive disassembly engine")]
struct Args {
    /// Executable image to analyze.
    pub path: PathBuf,
    /// Configuration file path (overrides discovery of `gorgon.toml`).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
    /// Module search directory offered to the provider registry.
    #[arg(long = "modules", default_value = ".")]
    pub modules: PathBuf,
    /// Overwrite an existing analysis database.
    #[arg(long)]
    pub overwrite: bool,
}

/// Prints label and lifecycle events as the analysis produces them.
struct EventLogger;

impl Subscriber for EventLogger {
    fn on_label_updated(&self, address: &Address, name: &str, removed: bool) {
        println!(
            "label updated: {name} at {address}, removed? {}",
            if removed { "yes" } else { "no" }
        );
    }

    fn on_document_updated(&self) {
        println!("document updated");
    }

    fn on_quit(&self) {
        println!("quitting");
    }
}

fn configure_logging(settings: &Settings) -> Option<WorkerGuard> {
    let log_path = Path::new(settings.log_file());
    let (dir, file) = match (log_path.parent(), log_path.file_name()) {
        (Some(dir), Some(file)) if !dir.as_os_str().is_empty() => (dir, file),
        (_, Some(file)) => (Path::new("."), file),
        _ => (Path::new("."), std::ffi::OsStr::new("gorgon.log")),
    };
    if log_path.exists() {
        let _ = std::fs::remove_file(log_path);
    }

    let file_appender = tracing_appender::rolling::never(dir, file);
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .try_init()
    {
        Ok(()) => Some(guard),
        Err(_) => {
            // A global subscriber is already installed; drop the guard so
            // the writer shuts down.
            None
        }
    }
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "runtime.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}

fn main() -> Result<()> {
    let args = Args::parse();
    let settings = core_config::load_from(args.config.clone())?;
    let _log_guard = configure_logging(&settings);
    install_panic_hook();
    info!(target: "runtime", "startup");

    let stream = BinaryStream::from_file(&args.path)
        .with_context(|| format!("reading {}", args.path.display()))?;
    println!(
        "analyzing {} ({} bytes), modules from {}",
        args.path.display(),
        stream.len(),
        args.modules.display()
    );

    let mut modules = ModuleManager::new();
    modules.load_modules(&args.modules, &stream);
    if modules.loaders().is_empty() {
        bail!("no loader available");
    }
    for loader in modules.loaders() {
        println!("loader available: {}", loader.name());
    }
    // Non-interactive front-end: take the first loader that recognized
    // the stream and the loader's preferred architecture.
    let loader = Arc::clone(&modules.loaders()[0]);
    let architecture = loader
        .main_architecture(modules.architectures())
        .or_else(|| modules.architectures().first().cloned());
    match &architecture {
        Some(architecture) => println!("architecture: {}", architecture.name()),
        None => println!("architecture: none registered, data analysis only"),
    }

    let mut model = ConfigurationModel::new();
    if let Some(architecture) = &architecture {
        architecture.fill_configuration_model(&mut model);
    }
    loader.fill_configuration_model(&mut model);
    let configuration = model.configuration();
    for option in model.iter() {
        println!("option {} = {:?}", option.name(), option.default_value());
    }
    loader.configure(&configuration);
    if let Some(architecture) = &architecture {
        architecture.use_configuration(&configuration);
    }

    let Some(factory) = modules.databases().first().cloned() else {
        bail!("no database available");
    };
    let mut database = factory.build();
    let db_path = args
        .path
        .with_extension(factory.extension().trim_start_matches('.'));
    database
        .create(&db_path, args.overwrite)
        .with_context(|| format!("creating the analysis database {}", db_path.display()))?;

    let operating_system = architecture
        .as_ref()
        .and_then(|architecture| modules.operating_system(loader.as_ref(), architecture.as_ref()));

    let mut engine = Engine::new(Arc::new(modules), &settings);
    engine.document().subscribe(
        Arc::new(EventLogger),
        EventMask::LABEL_UPDATED | EventMask::DOCUMENT_UPDATED | EventMask::QUIT,
    );
    engine.start(stream, loader, architecture, operating_system, database)?;

    println!("disassembling...");
    engine.wait_for_tasks();

    print_listing(&engine);

    let stats = engine.document().stats();
    println!(
        "done: {} areas, {} cells, {} multicells, {} labels, {} xrefs",
        stats.areas, stats.cells, stats.multicells, stats.labels, stats.xrefs
    );
    Ok(())
}

fn print_listing(engine: &Engine) {
    let document = engine.document();
    for area in document.memory_areas() {
        println!(
            "; area {} at {} ({} bytes, {:?})",
            area.name(),
            area.start(),
            area.size(),
            area.access()
        );
    }
    for (address, _cell) in document.cells() {
        if let Ok((banner, _)) = engine.format_multi_cell(&address) {
            println!();
            println!("{banner}");
        }
        if let Some(label) = document.label_at(&address) {
            println!("{}:", label.name());
        }
        let incoming = document.cross_references_to(&address);
        let annotation = if incoming.is_empty() {
            String::new()
        } else {
            let origins: Vec<String> = incoming
                .iter()
                .map(|(from, kind)| format!("{from} {kind:?}"))
                .collect();
            format!(" ; xref {}", origins.join(", "))
        };
        match engine.format_cell(&address) {
            Ok((text, _)) => println!("  {address}  {text}{annotation}"),
            Err(error) => println!("  {address}  <{error}>"),
        }
    }
}
