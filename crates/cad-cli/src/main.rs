mod chat;

use std::error::Error;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use cad_ai::ChatCompletionsModel;
use cad_session::{
    Config, ExportError, OperationError, RefinementController, Session, Turn, TurnId,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::chat::{ChatCommand, HELP};

type DynError = Box<dyn Error>;
type Controller = RefinementController<ChatCompletionsModel>;

#[derive(Debug, Parser)]
#[command(
    name = "cadloop",
    version,
    about = "Describe a part in plain language, get an STL, refine it turn by turn"
)]
struct Cli {
    /// Configuration file. Defaults to cadloop.toml in the storage directory.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory holding history.json and models/.
    #[arg(long, global = true, value_name = "DIR")]
    storage: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a new part from a description.
    Generate {
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },
    /// Change an existing part.
    Refine {
        #[arg(required = true, num_args = 1..)]
        change: Vec<String>,
        /// Turn to refine. Defaults to the latest turn.
        #[arg(long)]
        base: Option<String>,
    },
    /// Commit a script written by hand.
    Run {
        file: PathBuf,
        /// Description stored with the turn. Defaults to the file name.
        #[arg(long)]
        prompt: Option<String>,
        #[arg(long)]
        parent: Option<String>,
    },
    /// Check a script without running it.
    Validate { file: PathBuf },
    /// List committed turns.
    History,
    /// Print a turn's script and mesh summary.
    Show { id: String },
    /// Write a turn's STL file.
    Download {
        id: String,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Delete every turn and artifact.
    Clear,
    /// Interactive session on stdin.
    Chat,
}

fn main() -> Result<ExitCode, DynError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if let Command::Validate { file } = &cli.command {
        return validate_file(file);
    }

    let config = Config::discover(cli.config.as_deref(), cli.storage.as_deref())?;
    let mut session = Session::open(&config)?;
    let model = ChatCompletionsModel::new(config.generation.clone())?;
    let mut controller = Controller::from_config(model, &config)?;

    let outcome = match cli.command {
        Command::Generate { prompt } => controller
            .generate(&mut session, &prompt.join(" "))
            .map(|turn| print_turn(&turn)),
        Command::Refine { change, base } => refine(
            &mut controller,
            &mut session,
            &change.join(" "),
            base.as_deref(),
        ),
        Command::Run {
            file,
            prompt,
            parent,
        } => {
            let code = fs::read_to_string(&file)?;
            let prompt = prompt.unwrap_or_else(|| {
                file.file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
            run_code(&mut controller, &mut session, &prompt, &code, parent.as_deref())
        }
        Command::History => {
            print_history(&session);
            Ok(())
        }
        Command::Show { id } => show(&controller, &mut session, &id),
        Command::Download { id, output } => download(&controller, &session, &id, output),
        Command::Clear => controller
            .clear_history(&mut session)
            .map(|cleared| println!("cleared {cleared} turn(s)")),
        Command::Chat => return chat(&mut controller, &mut session),
        Command::Validate { .. } => Ok(()),
    };

    Ok(match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    })
}

fn validate_file(file: &Path) -> Result<ExitCode, DynError> {
    let code = fs::read_to_string(file)?;
    match cad_script::validate(&code) {
        Ok(_) => {
            println!("valid");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            println!(
                "{}:{}: {}",
                err.position.line, err.position.column, err.message
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

fn refine(
    controller: &mut Controller,
    session: &mut Session,
    change: &str,
    base: Option<&str>,
) -> Result<(), OperationError> {
    let base = match base {
        Some(text) => session.resolve(text)?,
        None => latest_turn(session)?,
    };
    let turn = controller.refine(session, change, base)?;
    print_turn(&turn);
    Ok(())
}

fn run_code(
    controller: &mut Controller,
    session: &mut Session,
    prompt: &str,
    code: &str,
    parent: Option<&str>,
) -> Result<(), OperationError> {
    let parent = parent.map(|text| session.resolve(text)).transpose()?;
    let turn = controller.run_code(session, prompt, code, parent)?;
    print_turn(&turn);
    Ok(())
}

fn show(controller: &Controller, session: &mut Session, id: &str) -> Result<(), OperationError> {
    let id = session.resolve(id)?;
    let turn = controller.load(session, id)?;
    print_turn(turn);
    println!("prompt   {}", turn.prompt);
    println!();
    println!("{}", turn.code);
    Ok(())
}

fn download(
    controller: &Controller,
    session: &Session,
    id: &str,
    output: Option<PathBuf>,
) -> Result<(), OperationError> {
    let id = session.resolve(id)?;
    let download = controller.download(session, id)?;
    let output = output.unwrap_or_else(|| PathBuf::from(&download.file_name));
    fs::write(&output, &download.bytes).map_err(|source| ExportError::Io {
        path: output.clone(),
        source,
    })?;
    println!("wrote {} ({} bytes)", output.display(), download.bytes.len());
    Ok(())
}

fn chat(controller: &mut Controller, session: &mut Session) -> Result<ExitCode, DynError> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    println!("describe a part to start; /help lists commands");

    loop {
        let marker = session
            .head()
            .map(|id| id.short())
            .unwrap_or_else(|| "new".to_string());
        print!("cadloop [{marker}]> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let Some(command) = ChatCommand::parse(&line) else {
            continue;
        };

        let outcome = match command {
            ChatCommand::Quit => break,
            ChatCommand::Help => {
                println!("{HELP}");
                Ok(())
            }
            ChatCommand::Invalid(message) => {
                eprintln!("{message}");
                Ok(())
            }
            ChatCommand::Prompt(text) => match session.head() {
                Some(head) => controller.refine(session, &text, head).map(|turn| print_turn(&turn)),
                None => controller.generate(session, &text).map(|turn| print_turn(&turn)),
            },
            ChatCommand::New(prompt) => controller
                .generate(session, &prompt)
                .map(|turn| print_turn(&turn)),
            ChatCommand::Load(id) => session
                .resolve(&id)
                .and_then(|id| controller.load(session, id).map(print_turn)),
            ChatCommand::History => {
                print_history(session);
                Ok(())
            }
            ChatCommand::Clear => controller
                .clear_history(session)
                .map(|cleared| println!("cleared {cleared} turn(s)")),
            ChatCommand::Download { id, output } => download(controller, session, &id, output),
        };
        if let Err(err) = outcome {
            report(&err);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn latest_turn(session: &Session) -> Result<TurnId, OperationError> {
    session
        .history()
        .last()
        .map(|turn| turn.id)
        .ok_or_else(|| OperationError::UnknownTurn("latest (history is empty)".to_string()))
}

fn report(err: &OperationError) {
    eprintln!("error [{}]: {err}", err.kind());
}

fn print_turn(turn: &Turn) {
    let summary = &turn.artifact.summary;
    let size: Vec<String> = (0..3)
        .map(|axis| format!("{:.2}", summary.bounds_max[axis] - summary.bounds_min[axis]))
        .collect();
    println!("turn     {}", turn.id);
    if let Some(parent) = turn.parent_id {
        println!("parent   {parent}");
    }
    println!("file     {}", turn.artifact.path.display());
    println!(
        "mesh     {} triangles, {:.2} mm^3, {} mm",
        summary.triangle_count,
        summary.volume,
        size.join(" x ")
    );
}

fn print_history(session: &Session) {
    if session.history().is_empty() {
        println!("no turns yet");
        return;
    }
    for turn in session.history() {
        let marker = if session.head() == Some(turn.id) { "*" } else { " " };
        let parent = turn
            .parent_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{marker} {}  {:<36}  {}  {}  {}",
            turn.id,
            parent,
            turn.created_at.format("%Y-%m-%d %H:%M:%S"),
            turn.artifact.file_name,
            turn.prompt
        );
    }
}
