use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::mpsc;

use albumsort::app::App;
use albumsort::config::Config;
use albumsort::logging;
use albumsort::server::ProgressServer;
use albumsort::tasks::{JobEvent, JobKind};

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Serve,
    Run(JobKind),
    Unsorted,
    Suggest(String),
    Move { photo_id: String, album_id: String },
}

struct Args {
    config_path: Option<PathBuf>,
    command: Command,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut positional = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("albumsort {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            arg if arg.starts_with('-') => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    match parse_command(&positional) {
        Ok(command) => Args {
            config_path,
            command,
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    }
}

fn parse_command(positional: &[String]) -> Result<Command> {
    let words: Vec<&str> = positional.iter().map(String::as_str).collect();
    Ok(match words.as_slice() {
        [] | ["serve"] => Command::Serve,
        ["run", job] => match JobKind::from_command(job) {
            Some(kind) => Command::Run(kind),
            None => bail!("unknown job {}", job),
        },
        ["unsorted"] => Command::Unsorted,
        ["suggest", photo_id] => Command::Suggest(photo_id.to_string()),
        ["move", photo_id, album_id] => Command::Move {
            photo_id: photo_id.to_string(),
            album_id: album_id.to_string(),
        },
        _ => bail!("unrecognised command {}", positional.join(" ")),
    })
}

fn print_help() {
    println!(
        r#"albumsort - describe photos and albums with a local vision model

USAGE:
    albumsort [OPTIONS] [COMMAND]

COMMANDS:
    serve                       Run the WebSocket progress server (default)
    run <job>                   Run one job in the foreground:
                                start_rescan, describe_photos,
                                describe_all_albums, retry_album_failures
    unsorted                    List photos that are in no album
    suggest <photo-id>          Suggest albums for an unsorted photo
    move <photo-id> <album-id>  Move a photo into an album

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    ALBUMSORT_CONFIG    Path to config file (overrides default location)
    ALBUMSORT_LOG       Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/albumsort/config.toml"#
    );
}

fn main() -> Result<()> {
    let args = parse_args();

    let config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    logging::init(config.logging.directory.as_deref())?;

    let app = App::new(config)?;

    match args.command {
        Command::Serve => {
            let server = ProgressServer::bind(app.config.server.address(), app.jobs.clone())?;
            server.run()
        }
        Command::Run(kind) => run_job(&app, kind),
        Command::Unsorted => {
            let photos = app.suggestions.unsorted_photos()?;
            println!("{}", serde_json::to_string_pretty(&photos)?);
            Ok(())
        }
        Command::Suggest(photo_id) => {
            let albums = app
                .suggestions
                .suggestions_for(&photo_id)
                .with_context(|| format!("Failed to suggest albums for photo {}", photo_id))?;
            println!("{}", serde_json::to_string_pretty(&albums)?);
            Ok(())
        }
        Command::Move { photo_id, album_id } => {
            app.suggestions.move_photo(&photo_id, &album_id)?;
            println!("Moved photo {} to album {}", photo_id, album_id);
            Ok(())
        }
    }
}

/// Run one job on the controller and print its events as JSON lines.
fn run_job(app: &App, kind: JobKind) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let handle = app.jobs.start(kind, tx)?;

    let mut failure = None;
    for event in rx {
        println!("{}", serde_json::to_string(&event)?);
        if let JobEvent::Error { error } = event {
            failure = Some(error);
        }
    }
    if handle.join().is_err() {
        bail!("{} job panicked", kind.display_name());
    }

    match failure {
        Some(error) => bail!("{} failed: {}", kind.display_name(), error),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command(&[]).unwrap(), Command::Serve);
        assert_eq!(parse_command(&words("serve")).unwrap(), Command::Serve);
        assert_eq!(
            parse_command(&words("run retry_album_failures")).unwrap(),
            Command::Run(JobKind::RetryAlbumFailures)
        );
        assert_eq!(
            parse_command(&words("move p1 a2")).unwrap(),
            Command::Move {
                photo_id: "p1".to_string(),
                album_id: "a2".to_string()
            }
        );
        assert!(parse_command(&words("run nothing")).is_err());
        assert!(parse_command(&words("suggest")).is_err());
    }
}
