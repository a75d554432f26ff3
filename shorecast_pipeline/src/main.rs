use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Parser, Subcommand};
use eyre::WrapErr;
use tracing_subscriber::EnvFilter;

use shorecast_pipeline::config::SiteConfig;
use shorecast_pipeline::{git, http, render, streams, DEFAULT_TEMPLATE, SITE_FILE};

#[derive(Parser)]
#[command(name = "shorecast-pipeline")]
#[command(about = "Beach-cam publishing pipeline", long_about = None)]
#[command(version)]
struct Cli {
    /// Work tree holding the template, state files, and git checkout
    #[arg(long, default_value = ".", global = true)]
    work_dir: PathBuf,

    /// Site definition file, relative to the work tree
    #[arg(long, default_value = SITE_FILE, global = true)]
    site: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the bundled template and stock site definition into the work tree
    Init {
        /// Overwrite files that already exist
        #[arg(long)]
        force: bool,
    },
    /// Resolve cam pages to direct stream URLs and update the directory
    Streams,
    /// Fetch marine data and render the page
    Render,
    /// Stage, commit, and push the work tree
    Publish,
    /// Run streams, render, and publish in order
    All,
}

/// Loaded context shared by the stage commands.
struct Stage {
    work_dir: PathBuf,
    site: SiteConfig,
}

impl Stage {
    fn load(work_dir: &Path, site_file: &str) -> eyre::Result<Self> {
        let site_path = work_dir.join(site_file);
        let (site, loaded) = SiteConfig::load_or_default(&site_path)?;
        if !loaded {
            println!("[site] no {} found, using stock definition", site_path.display());
        }
        Ok(Self {
            work_dir: work_dir.to_path_buf(),
            site,
        })
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.work_dir.join(relative)
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Init { force } => init(&cli.work_dir, &cli.site, force),
        Commands::Streams => {
            let stage = Stage::load(&cli.work_dir, &cli.site)?;
            run_streams(&stage).await
        }
        Commands::Render => {
            let stage = Stage::load(&cli.work_dir, &cli.site)?;
            run_render(&stage).await
        }
        Commands::Publish => {
            let stage = Stage::load(&cli.work_dir, &cli.site)?;
            run_publish(&stage).await
        }
        Commands::All => {
            let stage = Stage::load(&cli.work_dir, &cli.site)?;
            run_streams(&stage).await?;
            run_render(&stage).await?;
            run_publish(&stage).await
        }
    }
}

fn init(work_dir: &Path, site_file: &str, force: bool) -> eyre::Result<()> {
    std::fs::create_dir_all(work_dir)
        .wrap_err_with(|| format!("creating work tree {}", work_dir.display()))?;

    let site = SiteConfig::default();
    let template_path = work_dir.join(&site.template);
    if template_path.exists() && !force {
        println!("[init] {} exists, skipping (use --force)", template_path.display());
    } else {
        std::fs::write(&template_path, DEFAULT_TEMPLATE)
            .wrap_err_with(|| format!("writing {}", template_path.display()))?;
        println!("[init] wrote {}", template_path.display());
    }

    let site_path = work_dir.join(site_file);
    if site_path.exists() && !force {
        println!("[init] {} exists, skipping (use --force)", site_path.display());
    } else {
        site.save(&site_path)?;
        println!("[init] wrote {}", site_path.display());
    }
    Ok(())
}

async fn run_streams(stage: &Stage) -> eyre::Result<()> {
    println!("[streams] resolving {} cam(s)", stage.site.cams.len());
    let client = http::client()?;
    let state_path = stage.path(&stage.site.stream_state);
    let previous = streams::load_directory(&state_path)?;
    let (directory, report) = streams::resolve_all(&client, &stage.site.cams, &previous).await;
    streams::save_directory(&state_path, &directory)?;
    println!("[streams] {}", report.summary());
    Ok(())
}

async fn run_render(stage: &Stage) -> eyre::Result<()> {
    println!("[render] fetching marine data");
    let client = http::client()?;
    let now = Utc::now();
    let directory = streams::load_directory(&stage.path(&stage.site.stream_state))?;
    let data = render::gather(&client, &stage.site, directory, now).await;
    let rendered = render::render_to_file(&stage.work_dir, &stage.site, &data, now)?;
    println!(
        "[render] wrote {} ({} bytes)",
        rendered.path.display(),
        rendered.bytes
    );
    Ok(())
}

async fn run_publish(stage: &Stage) -> eyre::Result<()> {
    println!("[publish] {}", git::sync_work_tree(&stage.work_dir).await);
    let outcome = git::publish(&stage.work_dir, &stage.site.publish).await?;
    println!("[publish] {}", outcome.summary());
    Ok(())
}
