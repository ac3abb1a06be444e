/// Template Linter: runs the template validator over RON scene content.
///
/// Usage: template_linter <templates_dir|file> [--no-chain]
///
/// Exits 0 when every template is valid, 1 otherwise.

use rustc_hash::FxHashSet;
use scene_engine::core::store::{read_templates_ron, ron_files_in};
use scene_engine::core::validation::{validate, validate_main_story_chain};
use scene_engine::schema::template::SceneTemplate;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: template_linter <templates_dir|file> [--no-chain]");
        process::exit(0);
    }

    let target = Path::new(&args[1]);
    let check_chain = !args[2..].iter().any(|a| a == "--no-chain");

    let files: Vec<PathBuf> = if target.is_file() {
        vec![target.to_path_buf()]
    } else if target.is_dir() {
        match ron_files_in(target) {
            Ok(files) => files,
            Err(e) => {
                eprintln!("ERROR: Failed to list '{}': {}", target.display(), e);
                process::exit(1);
            }
        }
    } else {
        eprintln!("ERROR: Path '{}' does not exist", target.display());
        process::exit(1);
    };

    let mut errors: Vec<String> = Vec::new();
    let mut templates: Vec<SceneTemplate> = Vec::new();

    for path in &files {
        match read_templates_ron(path) {
            Ok(batch) => {
                println!("  Loaded: {} ({} templates)", path.display(), batch.len());
                templates.extend(batch);
            }
            Err(e) => errors.push(format!("{}: {}", path.display(), e)),
        }
    }

    let mut seen = FxHashSet::default();
    for template in &templates {
        if !seen.insert(template.id.as_str()) {
            errors.push(format!("Template '{}' is defined more than once", template.id));
        }
        let result = validate(template);
        for error in &result.errors {
            errors.push(format!("'{}' {}", template.id, error));
        }
    }

    if check_chain {
        let chain = validate_main_story_chain(&templates);
        for error in &chain.errors {
            errors.push(error.to_string());
        }
    }

    println!("\n=== Template Lint Report ===\n");

    if errors.is_empty() {
        println!("All checks passed!");
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} files, {} templates, {} errors",
        files.len(),
        templates.len(),
        errors.len()
    );

    if errors.is_empty() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}
