/// Blueprint Linter: resolves query blueprints against the builtin registries.
///
/// Usage: blueprint_linter <queries.ron | dir> [--quiet]

use query_blueprint::core::builtins::register_builtins;
use query_blueprint::core::logger::ConsoleLogger;
use query_blueprint::{ErrorLog, QueryBlueprintLibrary, Registries, TextualQueryBlueprint};
use std::path::Path;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: blueprint_linter <queries.ron | dir> [--quiet]");
        process::exit(0);
    }

    let input = Path::new(&args[1]);
    let quiet = args[2..].iter().any(|a| a == "--quiet");

    let mut sources = Vec::new();
    if input.is_file() {
        match TextualQueryBlueprint::load_list_from_ron(input) {
            Ok(list) => sources.extend(list),
            Err(e) => {
                eprintln!("ERROR: Failed to load query file: {}", e);
                process::exit(1);
            }
        }
    } else if input.is_dir() {
        load_queries_recursive(input, &mut sources);
    } else {
        eprintln!("ERROR: Path '{}' does not exist", input.display());
        process::exit(1);
    }

    println!("Loaded {} query blueprints", sources.len());

    let mut registries = Registries::new();
    if let Err(e) = register_builtins(&mut registries) {
        eprintln!("ERROR: Failed to register builtins: {}", e);
        process::exit(1);
    }

    let log = ErrorLog::new();
    for source in &mut sources {
        source.attach_error_log(&log);
    }

    let mut library = QueryBlueprintLibrary::new(Arc::new(registries));
    let failures = library.add_all(&sources);

    if !quiet {
        let mut logger = ConsoleLogger::new();
        for query in library.iter() {
            query.print_to_console(&mut logger);
        }
    }

    println!("\n=== Blueprint Lint Report ===\n");

    let errors = log.errors();
    if failures.is_empty() {
        println!("All checks passed!");
    }
    for error in &errors {
        println!("ERROR: {}", error);
    }
    // Only reached when a failure produced no collector message.
    if errors.is_empty() {
        for (name, err) in &failures {
            println!("ERROR: query '{}': {}", name, err);
        }
    }

    println!(
        "\nSummary: {} resolved, {} failed",
        library.len(),
        failures.len()
    );

    if failures.is_empty() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn load_queries_recursive(dir: &Path, sources: &mut Vec<TextualQueryBlueprint>) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                load_queries_recursive(&path, sources);
            } else if path.extension().and_then(|s| s.to_str()) == Some("ron") {
                match TextualQueryBlueprint::load_list_from_ron(&path) {
                    Ok(list) => {
                        println!("  Loaded: {}", path.display());
                        sources.extend(list);
                    }
                    Err(e) => {
                        eprintln!("  ERROR loading {}: {}", path.display(), e);
                    }
                }
            }
        }
    }
}
