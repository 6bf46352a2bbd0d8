use anyhow::Result;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

use facereel::config::Config;
use facereel::export::ExportFormat;
use facereel::logging;
use facereel::video::AnimationKind;
use facereel::{FacereelError, MemoryService};

enum Command {
    Upload(PathBuf),
    Groups,
    Video {
        group_ids: Vec<String>,
        animation: AnimationKind,
    },
    Videos,
    Export {
        path: PathBuf,
        format: ExportFormat,
    },
    ImportCsv(PathBuf),
}

struct Args {
    config_path: Option<PathBuf>,
    command: Command,
}

fn usage_error(message: &str) -> ! {
    eprintln!("Error: {}", message);
    print_help();
    std::process::exit(2);
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut positional: Vec<String> = Vec::new();
    let mut animation = None;
    let mut format = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("facereel {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    usage_error("--config requires a path argument");
                }
            }
            "--animation" | "-a" => {
                if i + 1 < args.len() {
                    animation = Some(AnimationKind::parse_or_default(&args[i + 1]));
                    i += 1;
                } else {
                    usage_error("--animation requires a kind");
                }
            }
            "--format" | "-f" => {
                if i + 1 < args.len() {
                    match ExportFormat::from_name(&args[i + 1]) {
                        Some(f) => format = Some(f),
                        None => usage_error(&format!("unknown export format: {}", args[i + 1])),
                    }
                    i += 1;
                } else {
                    usage_error("--format requires csv or json");
                }
            }
            arg if arg.starts_with('-') => usage_error(&format!("unknown argument: {}", arg)),
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        Some("upload") => match positional.next() {
            Some(path) => Command::Upload(PathBuf::from(path)),
            None => usage_error("upload requires a file or directory"),
        },
        Some("groups") => Command::Groups,
        Some("video") => {
            let group_ids: Vec<String> = positional.by_ref().collect();
            if group_ids.is_empty() {
                usage_error("video requires at least one group id");
            }
            Command::Video {
                group_ids,
                animation: animation.unwrap_or_default(),
            }
        }
        Some("videos") => Command::Videos,
        Some("export") => match positional.next() {
            Some(path) => {
                let path = PathBuf::from(path);
                let format = format.unwrap_or_else(|| {
                    path.extension()
                        .and_then(|e| ExportFormat::from_name(&e.to_string_lossy()))
                        .unwrap_or(ExportFormat::Csv)
                });
                Command::Export { path, format }
            }
            None => usage_error("export requires an output path"),
        },
        Some("import-csv") => match positional.next() {
            Some(path) => Command::ImportCsv(PathBuf::from(path)),
            None => usage_error("import-csv requires a path"),
        },
        Some(other) => usage_error(&format!("unknown command: {}", other)),
        None => usage_error("no command given"),
    };

    if let Some(extra) = positional.next() {
        usage_error(&format!("unexpected argument: {}", extra));
    }

    Args {
        config_path,
        command,
    }
}

fn print_help() {
    println!(
        r#"facereel - face clustering and memory videos

USAGE:
    facereel [OPTIONS] <COMMAND>

COMMANDS:
    upload <file|dir>              Upload a photo, or every photo under a directory
    groups                         List identity groups and their images
    video <group_id>...            Render a memory video for each group
        --animation, -a KIND       cross_fade (default), zoom, spiral, ken_burns
    videos                         List rendered videos
    export <path>                  Export the face table
        --format, -f FORMAT        csv (default) or json
    import-csv <path>              Import a legacy face_database.csv

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    FACEREEL_CONFIG     Path to config file (overrides default location)
    FACEREEL_LOG        Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/facereel/config.toml"#
    );
}

fn rejection(e: &FacereelError) -> Value {
    json!({
        "error": e.code(),
        "message": e.to_string(),
        "details": e.details(),
    })
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(service: Arc<MemoryService>, command: Command) -> Result<bool> {
    match command {
        Command::Upload(path) if path.is_dir() => {
            let entries = service.upload_dir(&path);
            let report: Vec<Value> = entries
                .iter()
                .map(|entry| match &entry.result {
                    Ok(outcome) => json!({ "path": entry.path, "result": outcome }),
                    Err(e) => json!({ "path": entry.path, "result": rejection(e) }),
                })
                .collect();
            print_json(&Value::Array(report))?;
            Ok(true)
        }
        Command::Upload(path) => respond(service.upload_file(&path).map(|o| json!(o))),
        Command::Groups => {
            let groups = service.list_groups().map(|groups| {
                let map: serde_json::Map<String, Value> = groups
                    .into_iter()
                    .map(|g| (g.group_id, json!(g.images)))
                    .collect();
                Value::Object(map)
            });
            respond(groups)
        }
        Command::Video {
            group_ids,
            animation,
        } => {
            let tasks: Vec<_> = group_ids
                .into_iter()
                .map(|group_id| {
                    let task = service
                        .clone()
                        .create_video_blocking_task(group_id.clone(), animation);
                    (group_id, tokio::spawn(task))
                })
                .collect();

            let mut all_ok = true;
            let mut report = serde_json::Map::new();
            for (group_id, handle) in tasks {
                let value = match handle.await? {
                    Ok(rendered) => json!(rendered),
                    Err(e) => {
                        all_ok = false;
                        rejection(&e)
                    }
                };
                report.insert(group_id, value);
            }
            print_json(&Value::Object(report))?;
            Ok(all_ok)
        }
        Command::Videos => respond(service.list_videos().map(|names| json!({ "videos": names }))),
        Command::Export { path, format } => respond(
            service
                .export(&path, format)
                .map(|rows| json!({ "path": path, "format": format.name(), "rows": rows })),
        ),
        Command::ImportCsv(path) => respond(service.import_legacy_csv(&path).map(|s| json!(s))),
    }
}

fn respond(result: Result<Value, FacereelError>) -> Result<bool> {
    match result {
        Ok(value) => {
            print_json(&value)?;
            Ok(true)
        }
        Err(e) => {
            print_json(&rejection(&e))?;
            Ok(false)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();

    // Initialize logging (uses journald on Linux, file fallback otherwise)
    let _ = logging::init(Some(Config::config_dir().join("logs")));

    let config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.ensure_dirs()?;

    let service = match MemoryService::open(&config) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            print_json(&rejection(&e))?;
            std::process::exit(1);
        }
    };

    if !run(service, args.command).await? {
        std::process::exit(1);
    }
    Ok(())
}
