// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use driving::{
    config::Settings,
    ide,
    link::Linker,
    manifest::Entry,
    path::Layout,
    skills,
    store::{install_path_note, FrameworkStore},
    vcs::Git2Vcs,
    workspace::Workspace,
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::{path::Path, process::exit, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "driving [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let cwd = std::env::current_dir()?;
        let layout = Layout::discover(&cwd);
        let settings = Settings::load(layout.root())?;
        let vcs = Arc::new(Git2Vcs::default());
        let ctx = Context {
            cwd: &cwd,
            layout,
            settings,
            vcs,
        };

        match self.command {
            Command::Pull => run_pull(ctx),
            Command::Commit(opts) => run_commit(ctx, opts),
            Command::Push => run_push(ctx),
            Command::Install(opts) => run_install(ctx, opts),
            Command::Uninstall => run_uninstall(ctx),
            Command::GitList(opts) => run_git_list(ctx, opts),
            Command::GitInstall(opts) => run_git_install(ctx, opts).await,
            Command::GitCheckout(opts) => run_git_checkout(ctx, opts),
            Command::GitPull(opts) => run_git_pull(ctx, opts),
            Command::GitSources(opts) => run_git_sources(ctx, opts),
            Command::IdeList => run_ide_list(ctx),
            Command::IdeSync(opts) => run_ide_sync(ctx, opts),
            Command::SkillsSync => run_skills_sync(ctx),
        }
    }
}

/// Everything a command needs, gathered once at startup.
struct Context<'a> {
    cwd: &'a Path,
    layout: Layout,
    settings: Settings,
    vcs: Arc<Git2Vcs>,
}

impl Context<'_> {
    fn store(&self) -> FrameworkStore<Git2Vcs> {
        FrameworkStore::new(self.layout.clone(), Arc::clone(&self.vcs))
    }

    fn workspace(&self) -> Workspace<Git2Vcs> {
        Workspace::new(self.layout.clone(), Arc::clone(&self.vcs))
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Pull latest configuration from remote.
    Pull,

    /// Commit every change of configuration.
    #[command(override_usage = "driving commit [message]")]
    Commit(CommitOptions),

    /// Push configuration commits to remote.
    Push,

    /// Add driving configuration as submodule of current directory.
    #[command(override_usage = "driving install [--url <url>]")]
    Install(InstallOptions),

    /// Remove driving configuration submodule of current directory.
    Uninstall,

    /// List frameworks of catalog.
    #[command(name = "git-list", override_usage = "driving git-list [options] [name]")]
    GitList(GitListOptions),

    /// Clone or update a framework and its extensions.
    #[command(name = "git-install", override_usage = "driving git-install <name>")]
    GitInstall(NameOptions),

    /// Switch installed framework to a branch.
    #[command(name = "git-checkout", override_usage = "driving git-checkout <name> <branch>")]
    GitCheckout(GitCheckoutOptions),

    /// Pull latest commits of installed framework.
    #[command(name = "git-pull", override_usage = "driving git-pull <name>")]
    GitPull(NameOptions),

    /// Show absolute source paths of a framework and its extensions as JSON.
    #[command(name = "git-sources", override_usage = "driving git-sources <name>")]
    GitSources(NameOptions),

    /// List available IDE configurations.
    #[command(name = "ide-list")]
    IdeList,

    /// Sync IDE configuration into project root.
    #[command(name = "ide-sync", override_usage = "driving ide-sync <ide>")]
    IdeSync(IdeSyncOptions),

    /// Render skills into AGENTS.md.
    #[command(name = "skills-sync")]
    SkillsSync,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CommitOptions {
    /// Commit message, defaults to configured message.
    #[arg(value_name = "message")]
    pub message: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InstallOptions {
    /// URL of driving repository, saved into .env for later runs.
    #[arg(short, long, value_name = "url")]
    pub url: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct GitListOptions {
    /// Only list this framework and its extensions.
    #[arg(value_name = "name")]
    pub name: Option<String>,

    /// Print JSON with absolute source paths instead of a table.
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct NameOptions {
    /// Name of framework in catalog.
    #[arg(required = true, value_name = "name")]
    pub name: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct GitCheckoutOptions {
    /// Name of framework in catalog.
    #[arg(required = true, value_name = "name")]
    pub name: String,

    /// Branch to switch to.
    #[arg(required = true, value_name = "branch")]
    pub branch: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct IdeSyncOptions {
    /// Name of IDE, e.g. cursor or kiro.
    #[arg(required = true, value_name = "ide")]
    pub ide: String,
}

#[tokio::main]
async fn main() {
    // INVARIANT: Logs go to stderr, stdout only carries command output.
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}

fn run_pull(ctx: Context<'_>) -> Result<()> {
    ctx.workspace().pull()?;
    Ok(())
}

fn run_commit(ctx: Context<'_>, opts: CommitOptions) -> Result<()> {
    let message = opts
        .message
        .unwrap_or_else(|| ctx.settings.default_commit_message.clone());
    ctx.workspace().commit(&message)?;
    Ok(())
}

fn run_push(ctx: Context<'_>) -> Result<()> {
    ctx.workspace().push()?;
    Ok(())
}

fn run_install(ctx: Context<'_>, opts: InstallOptions) -> Result<()> {
    let linker = Linker::new(ctx.cwd, Arc::clone(&ctx.vcs));
    linker.install(opts.url.as_deref(), &ctx.settings)?;
    Ok(())
}

fn run_uninstall(ctx: Context<'_>) -> Result<()> {
    Linker::new(ctx.cwd, Arc::clone(&ctx.vcs)).uninstall()?;
    Ok(())
}

fn run_git_list(ctx: Context<'_>, opts: GitListOptions) -> Result<()> {
    let store = ctx.store();
    if opts.json {
        return print_json(&store.listing(opts.name.as_deref())?);
    }

    let entries = store.list(opts.name.as_deref())?;
    print_table(
        &["NAME", "PROJECT", "URL", "BRANCH", "DESCRIPTION", "CREATOR", "DATE"],
        entries.iter().map(table_row).collect(),
    );
    println!();
    println!(
        "{}",
        install_path_note(&ctx.layout.framework_base_dir(), ctx.layout.mode())
    );

    Ok(())
}

async fn run_git_install(ctx: Context<'_>, opts: NameOptions) -> Result<()> {
    let report = ctx.store().install(&opts.name).await?;
    for (name, outcome) in &report.installed {
        info!("{name}: {outcome:?}");
    }
    Ok(())
}

fn run_git_checkout(ctx: Context<'_>, opts: GitCheckoutOptions) -> Result<()> {
    ctx.store().checkout(&opts.name, &opts.branch)?;
    Ok(())
}

fn run_git_pull(ctx: Context<'_>, opts: NameOptions) -> Result<()> {
    ctx.store().pull(&opts.name)?;
    Ok(())
}

fn run_git_sources(ctx: Context<'_>, opts: NameOptions) -> Result<()> {
    print_json(&ctx.store().sources(&opts.name)?)
}

fn run_ide_list(ctx: Context<'_>) -> Result<()> {
    let ides = ide::list_ides(&ctx.layout)?;
    if ides.is_empty() {
        info!("no IDE configuration found");
        return Ok(());
    }

    for name in ides {
        println!("{name}");
    }

    Ok(())
}

fn run_ide_sync(ctx: Context<'_>, opts: IdeSyncOptions) -> Result<()> {
    ide::sync(&ctx.layout, &opts.ide, &ctx.settings)?;
    Ok(())
}

fn run_skills_sync(ctx: Context<'_>) -> Result<()> {
    let report = skills::sync(&ctx.layout)?;
    for skill in &report.scan.skills {
        let description = match skill.description.char_indices().nth(50) {
            Some((cut, _)) => format!("{}...", &skill.description[..cut]),
            None => skill.description.clone(),
        };
        info!("{}: {description}", skill.name);
    }
    Ok(())
}

fn table_row(entry: &Entry) -> Vec<String> {
    vec![
        entry.name.clone(),
        entry.project_name.clone(),
        entry.url.clone(),
        entry.branch.clone().unwrap_or_else(|| "-".into()),
        entry.description.clone(),
        entry.creator.clone(),
        entry.date.clone(),
    ]
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths = headers
        .iter()
        .map(|header| header.chars().count())
        .collect::<Vec<_>>();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let render = |cells: Vec<String>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    println!(
        "{}",
        render(headers.iter().map(ToString::to_string).collect())
    );
    println!(
        "{}",
        render(widths.iter().map(|width| "-".repeat(*width)).collect())
    );
    for row in rows {
        println!("{}", render(row));
    }
}
