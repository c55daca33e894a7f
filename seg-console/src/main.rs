mod session;
mod sink;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use seg_core::action::ActionContext;
use seg_core::app::Application;
use seg_core::config::Config;
use seg_types::{ActionSource, ActionStatus};

use sink::ConsoleSink;

const USAGE: &str = "\
usage: seg-console [-v|--verbose] [--script FILE] [COMMAND...]

Without a script or command, reads commands from stdin.
Console commands: help [ACTION], vars, quit";

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("seg3d")
        .join("seg-console.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = match File::create(&log_path) {
        Ok(file) => file,
        Err(_) => match File::create(std::env::temp_dir().join("seg-console.log")) {
            Ok(file) => file,
            Err(e) => {
                eprintln!("warning: no log file: {}", e);
                return;
            }
        },
    };

    if WriteLogger::init(log_level, simplelog::Config::default(), log_file).is_err() {
        eprintln!("warning: logger already initialised");
    }

    log::info!(target: "console", "seg-console starting (log level: {:?})", log_level);
}

enum Input {
    Script(PathBuf),
    Args(String),
    Stdin,
}

struct Options {
    verbose: bool,
    input: Input,
}

fn parse_args(args: &[String]) -> Result<Option<Options>, String> {
    let mut verbose = false;
    let mut script = None;
    let mut words = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "-v" | "--verbose" => verbose = true,
            "--script" => match iter.next() {
                Some(path) => script = Some(PathBuf::from(path)),
                None => return Err("--script needs a file".into()),
            },
            _ => words.push(arg.clone()),
        }
    }
    let input = match (script, words.is_empty()) {
        (Some(_), false) => return Err("give either --script or a command, not both".into()),
        (Some(path), true) => Input::Script(path),
        (None, false) => Input::Args(words.join(" ")),
        (None, true) => Input::Stdin,
    };
    Ok(Some(Options { verbose, input }))
}

/// Executes console lines against one application.
struct Console {
    app: Arc<Application>,
    source: ActionSource,
    failures: usize,
}

enum Flow {
    Continue,
    Quit,
}

impl Console {
    fn execute(&mut self, line: &str) -> Flow {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Flow::Continue;
        }
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        match word {
            "quit" | "exit" => return Flow::Quit,
            "help" => {
                if !self.help(rest.trim()) {
                    self.failures += 1;
                }
            }
            "vars" => self.vars(),
            _ => self.dispatch(line),
        }
        Flow::Continue
    }

    /// Usage of every action, or of `topic` in detail.
    fn help(&self, topic: &str) -> bool {
        let factory = self.app.factory();
        if topic.is_empty() {
            for name in factory.types() {
                if let Some(usage) = factory.usage(&name) {
                    println!("  {}", usage);
                }
            }
            return true;
        }
        match (factory.usage(topic), factory.info(topic)) {
            (Some(usage), Some(info)) => {
                println!("{}\n  {}", usage, info.description);
                for param in info.params {
                    println!("    {:<10} {}", param.name, param.description);
                }
                true
            }
            _ => {
                eprintln!("error: unknown action '{}'", topic);
                false
            }
        }
    }

    fn vars(&self) {
        let store = self.app.state().primary();
        for id in store.ids() {
            if let Ok(value) = store.export_to_string(&id) {
                println!("{} = {}", id, value);
            }
        }
    }

    fn dispatch(&mut self, line: &str) {
        let action = match self.app.factory().create(line) {
            Ok(action) => action,
            Err(e) => {
                eprintln!("error: {}", e);
                self.failures += 1;
                return;
            }
        };
        let ctx = ActionContext::with_sink(self.source, Arc::new(ConsoleSink));
        if let Err(e) = self.app.dispatcher().post_and_wait(action, &ctx) {
            eprintln!("error: {}", e);
            self.failures += 1;
            return;
        }
        match ctx.status() {
            ActionStatus::Success => {
                if let Some(result) = ctx.result() {
                    println!("{}", result);
                }
            }
            status => {
                log::debug!(target: "console", "'{}' ended {:?}", line, status);
                self.failures += 1;
            }
        }
    }
}

fn run_lines(console: &mut Console, reader: impl BufRead, prompt: bool) -> io::Result<()> {
    let mut lines = reader.lines();
    loop {
        if prompt {
            print!("> ");
            io::stdout().flush()?;
        }
        let Some(line) = lines.next() else { break };
        if let Flow::Quit = console.execute(&line?) {
            break;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(Some(options)) => options,
        Ok(None) => {
            println!("{}", USAGE);
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("error: {}\n{}", e, USAGE);
            return ExitCode::from(2);
        }
    };
    init_logging(options.verbose);

    let app = match Application::start(Config::load()) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = session::seed(&app) {
        eprintln!("error: {}", e);
        app.shutdown();
        return ExitCode::FAILURE;
    }

    let source = match options.input {
        Input::Script(_) => ActionSource::Script,
        _ => ActionSource::CommandLine,
    };
    let mut console = Console {
        app: Arc::clone(&app),
        source,
        failures: 0,
    };

    let outcome = match options.input {
        Input::Script(path) => File::open(&path)
            .and_then(|file| run_lines(&mut console, BufReader::new(file), false))
            .map_err(|e| format!("{}: {}", path.display(), e)),
        Input::Args(line) => {
            console.execute(&line);
            Ok(())
        }
        Input::Stdin => run_lines(&mut console, io::stdin().lock(), true)
            .map_err(|e| e.to_string()),
    };

    app.shutdown();
    match outcome {
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
        Ok(()) if console.failures > 0 => ExitCode::FAILURE,
        Ok(()) => ExitCode::SUCCESS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn remaining_words_form_one_command() {
        let options = parse_args(&args(&["-v", "set", "session::label", "scan"]))
            .unwrap()
            .unwrap();
        assert!(options.verbose);
        assert!(matches!(options.input, Input::Args(ref line) if line == "set session::label scan"));
    }

    #[test]
    fn script_and_command_conflict() {
        assert!(parse_args(&args(&["--script", "a.txt", "undo"])).is_err());
        assert!(parse_args(&args(&["--script"])).is_err());
        assert!(parse_args(&args(&["--help"])).unwrap().is_none());
        assert!(matches!(
            parse_args(&[]).unwrap().unwrap().input,
            Input::Stdin
        ));
    }

    #[test]
    fn script_lines_run_in_order() {
        let app = Application::start(Config::default()).unwrap();
        session::seed(&app).unwrap();
        let mut console = Console {
            app: Arc::clone(&app),
            source: ActionSource::Script,
            failures: 0,
        };
        let script = "# comment\nset session::brightness 70\n\nset session::active_tool Paint\nset session::contrast 500\nquit\nset session::label never\n";
        run_lines(&mut console, script.as_bytes(), false).unwrap();

        let store = app.state().primary();
        assert_eq!(store.export_to_string("session::brightness").unwrap(), "70");
        assert_eq!(store.export_to_string("session::active_tool").unwrap(), "paint");
        assert_eq!(store.export_to_string("session::label").unwrap(), "untitled");
        assert_eq!(console.failures, 1);
        assert_eq!(app.undo_buffer().num_undo_items(), 2);
        app.shutdown();
    }
}
