use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use versioner::cli::{self, Backend, BumpWorkflowArgs, Query, SourceArgs};
use versioner::release::ReleaseStatus;
use versioner::{config, logging, ui};

#[derive(Parser)]
#[command(
    name = "versioner",
    version,
    about = "Compute, tag and publish semantic versions from conventional commits"
)]
struct Args {
    #[arg(short, long, global = true, help = "Custom configuration file path")]
    config: Option<PathBuf>,

    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase log detail (-v info, -vv debug, -vvv trace)"
    )]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct SourceOpts {
    #[arg(short, long, default_value = ".", help = "Source tree to release")]
    source: PathBuf,

    #[arg(
        short,
        long = "module",
        value_name = "PATH",
        help = "Module directory inside the repository (repeatable, default: root)"
    )]
    modules: Vec<String>,

    #[arg(long, value_enum, default_value_t = Backend::Git2, help = "Git backend")]
    backend: Backend,
}

impl From<SourceOpts> for SourceArgs {
    fn from(opts: SourceOpts) -> Self {
        SourceArgs {
            source: opts.source,
            modules: opts.modules,
            backend: opts.backend,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Compute the next version, tag it and push the tag
    BumpVersion {
        #[command(flatten)]
        source: SourceOpts,

        #[arg(long, help = "Print only the resulting version on stdout")]
        output_version: bool,

        #[arg(long, help = "Create the tag locally without pushing")]
        no_push: bool,

        #[arg(long, help = "Remote to push to (overrides configuration)")]
        remote: Option<String>,

        #[arg(long, help = "Fail if the computed tag already exists")]
        strict: bool,

        #[arg(long, help = "Move an existing tag and force-push it")]
        force_tag: bool,
    },
    /// Print the latest released version
    CurrentVersion {
        #[command(flatten)]
        source: SourceOpts,
    },
    /// Print the version the next release would get
    NextVersion {
        #[command(flatten)]
        source: SourceOpts,
    },
    /// Print the changelog entry of the next release
    Changelog {
        #[command(flatten)]
        source: SourceOpts,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init_logging(args.verbose);

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            ui::display_error(&e.to_string());
            for cause in e.chain().skip(1) {
                eprintln!("  caused by: {}", cause);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let config = config::load_config(args.config.as_deref())?;

    match args.command {
        Command::BumpVersion {
            source,
            output_version,
            no_push,
            remote,
            strict,
            force_tag,
        } => {
            let workflow = BumpWorkflowArgs {
                source: source.into(),
                no_push,
                remote,
                strict,
                force_tag,
            };
            bump(&workflow, config, output_version)
        }
        Command::CurrentVersion { source } => {
            query(source.into(), Query::CurrentVersion, config, args.verbose)
        }
        Command::NextVersion { source } => {
            query(source.into(), Query::NextVersion, config, args.verbose)
        }
        Command::Changelog { source } => {
            query(source.into(), Query::Changelog, config, args.verbose)
        }
    }
}

fn bump(
    workflow: &BumpWorkflowArgs,
    config: config::Config,
    output_version: bool,
) -> Result<ExitCode> {
    let result = cli::run_bump_workflow(workflow, config)?;

    for release in &result.releases {
        ui::display_release_warnings(release);

        if output_version {
            println!("{}", release.version);
        } else {
            println!("{}", ui::format_release(release));
        }

        if release.status == ReleaseStatus::Created && !release.pushed {
            ui::display_manual_push_instruction(&release.tag, &result.remote);
        } else if release.pushed {
            ui::display_success(&format!("Pushed {} to {}", release.tag, result.remote));
        }
    }

    for (namespace, error) in &result.failures {
        ui::display_error(&format!("{}: {}", namespace, error));
    }

    Ok(if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn query(
    source: SourceArgs,
    query: Query,
    config: config::Config,
    verbose: u8,
) -> Result<ExitCode> {
    for output in cli::run_query(&source, query, config)? {
        if let Some(current) = &output.current {
            current.warnings.iter().for_each(ui::display_boundary_warning);
            if verbose > 0 {
                let status = match &current.tag {
                    Some(tag) => format!("{} released as {}", output.namespace, tag),
                    None => format!("{} has no release yet", output.namespace),
                };
                ui::display_status(&status);
            }
        }

        if let Some(plan) = &output.plan {
            plan.warnings.iter().for_each(ui::display_boundary_warning);
            if verbose > 0 {
                ui::display_commit_analysis(&plan.commits, plan.namespace.as_str());
                ui::display_proposed_tag(plan.current.tag.as_deref(), &plan.tag);
            }
            ui::display_status(&ui::format_plan(plan));
        }

        match query {
            Query::Changelog => print!("{}", output.text),
            _ => println!("{}", output.text),
        }
    }

    Ok(ExitCode::SUCCESS)
}
