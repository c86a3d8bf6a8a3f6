use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use bellows::config::{BuildContext, Config, Profile};
use bellows::graph::TaskGraph;
use bellows::runner;
use bellows::tasks;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TaskName {
    /// Full dev build, then serve the output and watch for changes.
    Dev,
    /// Full production build.
    Dist,
    /// Full production build, then serve the output.
    #[value(name = "dist:server")]
    DistServer,
    /// Full build for the dev profile, without serving or watching.
    Build,
    Styles,
    Scripts,
    Images,
    Icons,
    Templates,
    /// Dev build, then watch for changes without serving.
    Watch,
    /// Run the configured linters over the script sources.
    #[value(name = "js:lint")]
    JsLint,
}

impl TaskName {
    fn goal(self) -> &'static str {
        match self {
            TaskName::Dev | TaskName::Dist | TaskName::DistServer | TaskName::Watch => "build",
            TaskName::Build => "build",
            TaskName::Styles => "styles",
            TaskName::Scripts => "scripts",
            TaskName::Images => "images",
            TaskName::Icons => "icons",
            TaskName::Templates => "templates",
            TaskName::JsLint => "js:lint",
        }
    }

    fn profile(self) -> Profile {
        match self {
            TaskName::Dist | TaskName::DistServer => Profile::Dist,
            _ => Profile::Dev,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "bellows", version, about)]
struct Cli {
    /// The task to run.
    #[arg(value_enum, default_value_t = TaskName::Dev)]
    task: TaskName,

    /// Path to the configuration file.
    #[arg(long, default_value = "bellows.json")]
    config: camino::Utf8PathBuf,
}

fn main() -> ExitCode {
    bellows::init_logging();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = Config::load_or_default(&cli.config)?;
    let ctx = BuildContext::new(cli.task.profile(), &config);
    let graph = tasks::standard(&config.paths)?;

    tracing::info!(profile = %ctx.profile, task = ?cli.task, "starting");

    match cli.task {
        TaskName::Dev => {
            run_build(&graph, &ctx, "build")?;
            let _server = runner::http::start(ctx.out_root(), ctx.options.serve.clone());
            runner::watch::watch(&graph, &ctx)?;
            Ok(ExitCode::SUCCESS)
        }
        TaskName::Watch => {
            run_build(&graph, &ctx, "build")?;
            runner::watch::watch(&graph, &ctx)?;
            Ok(ExitCode::SUCCESS)
        }
        TaskName::DistServer => {
            let code = run_build(&graph, &ctx, "build")?;
            if code != ExitCode::SUCCESS {
                return Ok(code);
            }
            let server = runner::http::start(ctx.out_root(), ctx.options.serve.clone());
            match server.join() {
                Ok(result) => result?,
                Err(_) => anyhow::bail!("the HTTP server thread panicked"),
            }
            Ok(ExitCode::SUCCESS)
        }
        task => run_build(&graph, &ctx, task.goal()),
    }
}

/// Run a goal task and report the outcome. Task failures already reached the
/// user through the per-task reporter, so here they only decide the exit
/// code.
fn run_build(graph: &TaskGraph, ctx: &BuildContext, goal: &str) -> anyhow::Result<ExitCode> {
    let report = runner::run_goal(graph, ctx, goal)?;
    report.summarize();

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
