use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use conductor::config::{load_config, Config, Selection};
use conductor::domain::BumpPolicy;
use conductor::editor;
use conductor::git::Git2Repository;
use conductor::publish::{self, GhCli};
use conductor::release::{Orchestrator, PkgTags, ReleaseOptions, PKGTAGS_FILE};
use conductor::ui::{self, TerminalUI};
use conductor::xtest::{self, ProcessRunner, XtestOptions};
use conductor::ConductorError;

#[derive(Parser)]
#[command(
    name = "conductor",
    version,
    about = "Coordinate tagged releases across interdependent git repositories"
)]
struct Cli {
    #[arg(short, long, global = true, help = "Configuration file path")]
    config: Option<PathBuf>,

    #[arg(short, long, global = true, action = clap::ArgAction::Count, help = "More logging (-v debug, -vv trace)")]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Commit, pin and tag every repository that needs a release
    Release {
        #[arg(long, default_value = "minor", help = "Version component to bump: patch, minor or major")]
        bump: BumpPolicy,

        #[arg(long, value_name = "NAME", help = "Only consider these packages")]
        only: Vec<String>,

        #[arg(long, value_name = "NAME", help = "Leave these packages out")]
        exclude: Vec<String>,

        #[arg(short, long, default_value = PKGTAGS_FILE, help = "Where to write the released tags")]
        output: PathBuf,

        #[arg(long, help = "Fetch from origin before inspecting repositories")]
        fetch: bool,

        #[arg(long, help = "Accept modified tracked files")]
        allow_dirty: bool,

        #[arg(long, help = "Show the release plan without changing anything")]
        dry_run: bool,
    },

    /// Push released branches and tags, then dispatch the publish workflow
    Publish {
        #[arg(long, help = "Tags written by `conductor release`")]
        pkgtags: PathBuf,
    },

    /// Dispatch the bundle workflow for released tags
    Bundle {
        #[arg(long, help = "Tags written by `conductor release`")]
        pkgtags: PathBuf,

        #[arg(long, help = "Name of the bundle")]
        name: Option<String>,
    },

    /// Test development checkouts against released versions of their siblings
    Xtest {
        #[arg(long = "ref", value_name = "NAME==VERSION", required = true)]
        refs: Vec<String>,

        #[arg(long = "dev", value_name = "NAME==REF", required = true)]
        devs: Vec<String>,

        #[arg(long, default_value = "python3")]
        python: String,
    },
}

/// Log to stderr; `RUST_LOG` wins over `-v`
fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(e) = editor::install_interrupt_handler() {
        tracing::warn!("{}", e);
    }

    if let Err(e) = run(cli) {
        ui::display_error(&e.to_string());
        let code = e
            .downcast_ref::<ConductorError>()
            .map(ConductorError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }

    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let editor = std::env::var("EDITOR").ok();
    let config = load_config(cli.config.as_deref(), &cwd)?;

    match cli.command {
        Command::Release {
            bump,
            only,
            exclude,
            output,
            fetch,
            allow_dirty,
            dry_run,
        } => {
            let options = ReleaseOptions {
                selection: Selection::from_flags(only, exclude)?,
                policy: bump,
                fetch,
                allow_dirty,
                dry_run,
            };
            release(&config, &options, &output, editor)
        }
        Command::Publish { pkgtags } => {
            let pkgtags = PkgTags::read(&pkgtags)?;
            let mut ui = TerminalUI::new(editor);
            publish::publish(
                &config,
                &pkgtags,
                |spec| Git2Repository::open(&spec.repo_path),
                &mut ui,
                &GhCli::new(),
            )?;
            Ok(())
        }
        Command::Bundle { pkgtags, name } => {
            let pkgtags = PkgTags::read(&pkgtags)?;
            publish::bundle(&config, &pkgtags, name.as_deref(), &GhCli::new())?;
            ui::display_success("Bundle workflow dispatched");
            Ok(())
        }
        Command::Xtest { refs, devs, python } => {
            let options = XtestOptions {
                refs,
                devs,
                python,
                workspace: cwd,
            };
            let report = xtest::cross_test(&config, &options, &mut ProcessRunner)?;
            ui::display_success(&format!(
                "Cross-tests passed for {} in {}",
                report.tested.join(", "),
                report.env_dir.display()
            ));
            Ok(())
        }
    }
}

fn release(
    config: &Config,
    options: &ReleaseOptions,
    output: &Path,
    editor: Option<String>,
) -> Result<()> {
    let mut ui = TerminalUI::new(editor);
    let mut pkgtags = PkgTags::new();
    let result = Orchestrator::new(config, &mut ui).run(options, &mut pkgtags, |spec| {
        Git2Repository::open(&spec.repo_path)
    });

    if options.dry_run {
        result?;
        return Ok(());
    }

    // Releases finished before a failure are still recorded
    pkgtags.write(output)?;
    let report = result?;

    ui::display_release_summary(&report.outcomes);
    if report.aborted {
        ui::display_status("Release aborted after a cancelled commit");
    }
    if !pkgtags.is_empty() {
        ui::display_publish_instruction(output);
    }
    Ok(())
}
