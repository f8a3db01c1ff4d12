mod backend;
mod config;
mod export;
mod review;

use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, info, info_span};
use tracing_subscriber::EnvFilter;

use config::{Config, Target};
use review::MergeOptions;

/// Export the review comments of a pull/merge request on GitHub, GitLab or
/// GitBucket as CSV, together with the review session recorded in the
/// discussion.
///
/// Every option can also be set in `.pr-review-export.toml`; flags win.
#[derive(Parser, Debug)]
#[command(name = "pr-review-export", version, about)]
struct Cli {
    /// Hosting service
    #[arg(long, value_enum)]
    target: Option<Target>,

    /// API root URL. Not needed for github.com and gitlab.com
    #[arg(long)]
    endpoint: Option<String>,

    /// Access token; `user:password` for GitBucket.
    /// Falls back to GITHUB_TOKEN, GITLAB_TOKEN or GITBUCKET_TOKEN
    #[arg(long)]
    access_token: Option<String>,

    /// Organization or owner (not used by GitLab)
    #[arg(long)]
    org: Option<String>,

    /// Repository name, or the project id on GitLab
    #[arg(long)]
    repo: Option<String>,

    /// Pull request (merge request) number
    #[arg(long)]
    pull: Option<String>,

    /// Prefix put before each follow-up comment when a thread is folded [default: (追記)]
    #[arg(long)]
    post_script_prefix: Option<String>,

    /// Line separating the reviewer's remark from the reviewee's answer [default: ~~]
    #[arg(long)]
    delimiter: Option<String>,

    /// Which review session to export [default: 1]
    #[arg(long)]
    review_times: Option<String>,

    /// CSV file to write. Without it a summary is printed to the terminal
    #[arg(short, long)]
    csv_file: Option<PathBuf>,

    /// Proxy URL, e.g. http://proxy.example.com:3128
    #[arg(long)]
    proxy: Option<String>,

    /// Page size for paginated requests, 1-100 [default: 100]
    #[arg(long)]
    page_size: Option<u32>,

    /// Config file [default: .pr-review-export.toml]
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn overrides(self) -> Config {
        Config {
            target: self.target,
            endpoint: self.endpoint,
            access_token: self.access_token,
            org: self.org,
            repo: self.repo,
            pull: self.pull,
            postscript_prefix: self.post_script_prefix,
            delimiter: self.delimiter,
            review_iteration: self.review_times,
            csv_file: self.csv_file,
            proxy: self.proxy,
            page_size: self.page_size,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mut cli = Cli::parse();

    info!("loading configuration");
    let file_config = Config::load(cli.config.take().as_deref())?;
    let settings = file_config.merge(cli.overrides()).resolve()?;

    let _main_span = info_span!(
        "export",
        target_service = %settings.target,
        repo = %settings.repo,
        pull = settings.pull
    )
    .entered();
    debug!(endpoint = %settings.endpoint, page_size = settings.page_size, "resolved settings");

    let backend = backend::build(&settings)?;
    let options = MergeOptions {
        iteration: settings.review_iteration.clone(),
        delimiter: (settings.target != Target::Gitlab).then(|| settings.delimiter.clone()),
        postscript_prefix: settings.postscript_prefix.clone(),
    };

    info!("fetching review discussions");
    let extraction = review::extract(backend.as_ref(), &options).await?;
    info!(
        records = extraction.records.len(),
        additions = extraction.additions,
        deletions = extraction.deletions,
        "extraction complete"
    );

    let report = export::build(extraction);
    export::output(&report, settings.csv_file.as_deref())?;
    info!("done");

    Ok(())
}
