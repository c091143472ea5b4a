use clap::{Arg, ArgAction, Command};
use foff_composites::config::Config;
use foff_composites::store::{CompositeSummary, PhaseReport};
use foff_composites::{BooleanEngine, CompositeLoader, CompositeStore, CompositesMap, MapSource};
use log::LevelFilter;
use std::process;

#[tokio::main]
async fn main() {
    let matches = Command::new("foff-composites")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Composite rule loader and two-phase scheduler for FOFF filters")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value(Config::default_path()),
        )
        .arg(
            Arg::new("map")
                .long("map")
                .value_name("URL")
                .help("Additional composites map (path, file:// or http(s):// URL)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Write an example configuration file")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Load configured composites and report any that fail")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print the schedule as JSON")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging, including dependency analysis")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or(Config::default_path());
    let config = Config::load_from_file(config_path);

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        config
            .as_ref()
            .ok()
            .and_then(|c| c.logging.as_ref())
            .and_then(|l| l.level.parse().ok())
            .unwrap_or(LevelFilter::Info)
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            process::exit(1);
        }
    };

    let engine = match BooleanEngine::new() {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error building expression engine: {e}");
            process::exit(1);
        }
    };

    let mut metric = config.build_metric();
    let mut store = CompositeStore::new();
    let mut loader = CompositeLoader::new(&mut store, &mut metric, &engine)
        .with_unknown_weight(config.unknown_weight());

    let summary = config.load_composites(&mut loader);

    if matches.get_flag("test-config") {
        println!("🔍 Testing configuration...");
        println!();
        println!("Configured composites: {}", config.composites.len());
        println!("Loaded composites: {}", summary.loaded);
        println!("Skipped composites: {}", summary.skipped);
        println!("Primitive symbols: {}", config.symbols.len());
        if summary.failed > 0 {
            println!("❌ {} composites failed to load", summary.failed);
            process::exit(1);
        }
        println!("✅ All composites loaded successfully");
        return;
    }

    let extra_maps = matches
        .get_many::<String>("map")
        .into_iter()
        .flatten()
        .cloned();
    for location in config.composites_maps.iter().cloned().chain(extra_maps) {
        let source = match MapSource::parse(&location) {
            Ok(source) => source,
            Err(e) => {
                log::error!("cannot load composites map from {location}: {e}");
                continue;
            }
        };

        let mut map = CompositesMap::new(source.location());
        match source.fetch_into(&mut map).await {
            Ok(()) => {
                map.finish(&mut loader);
            }
            Err(e) => log::error!("{e:#}"),
        }
    }

    store.process_dependencies(&metric);
    let report = store.report();

    if matches.get_flag("json") {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing schedule: {e}");
                process::exit(1);
            }
        }
    } else {
        print_report(&report);
    }
}

fn generate_default_config(path: &str) {
    let result = serde_yaml::to_string(&Config::example())
        .map_err(anyhow::Error::from)
        .and_then(|yaml| std::fs::write(path, yaml).map_err(anyhow::Error::from));

    match result {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}

fn print_report(report: &PhaseReport) {
    println!("📋 Composite Schedule");
    println!("═══════════════════════════════════════");
    print_phase("First pass", &report.first_pass);
    println!();
    print_phase("Second pass", &report.second_pass);
}

fn print_phase(title: &str, composites: &[CompositeSummary]) {
    println!("{title} ({}):", composites.len());
    if composites.is_empty() {
        println!("  (none)");
        return;
    }
    for composite in composites {
        println!(
            "  • {:<32} {:>7.2} {:<14} {}",
            truncate_string(&composite.name, 32),
            composite.score,
            composite.policy.to_string(),
            truncate_string(&composite.expression, 60)
        );
    }
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
