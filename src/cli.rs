use clap::{Args, Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{parse_interval, ConfigStore, Configuration};
use crate::host::profile::{self, ProfilePaths};
use crate::host::RunConfig;
use crate::store::JsonFileStore;
use crate::url_filter::UrlFilter;
use crate::version::APP_VERSION;

#[derive(Parser)]
#[command(name = "autoclick", version = APP_VERSION)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a browser and keep clicking the configured element in every tab.
    Run(RunArgs),
    /// Inspect or edit the stored configuration.
    Config(ConfigArgs),
    Profile(ProfileArgs),
}

#[derive(Args)]
struct ProfileSelection {
    /// Named profile; each has its own browser data and configuration.
    #[arg(long, value_name = "NAME")]
    profile: Option<String>,
    /// Base directory holding profiles (defaults to the user data dir).
    #[arg(long = "profile-dir", value_name = "DIR")]
    profile_dir: Option<PathBuf>,
    /// Configuration file to use instead of the profile's store.json.
    #[arg(long, value_name = "PATH")]
    store: Option<PathBuf>,
}

impl ProfileSelection {
    fn resolve(&self) -> Result<ProfilePaths, Box<dyn Error>> {
        profile::resolve_profile(self.profile.as_deref(), self.profile_dir.as_deref())
            .map_err(|e| -> Box<dyn Error> { e.to_string().into() })
    }

    fn store_path(&self) -> Result<PathBuf, Box<dyn Error>> {
        match self.store.as_ref() {
            Some(path) => Ok(path.clone()),
            None => Ok(self.resolve()?.store_path),
        }
    }
}

#[derive(Args)]
struct RunArgs {
    /// Page to open once the browser starts.
    #[arg(value_name = "URL")]
    url: Option<String>,
    #[command(flatten)]
    selection: ProfileSelection,
    /// Chrome or Edge executable.
    #[arg(long, value_name = "PATH")]
    browser: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    headless: bool,
    /// Keep configuration in memory; nothing is written to disk.
    #[arg(long, default_value_t = false)]
    ephemeral: bool,
    /// Only run on pages matching this pattern (`*` wildcards). Repeatable.
    #[arg(long = "match", value_name = "PATTERN")]
    matches: Vec<String>,
    /// Never run on pages matching this pattern. Repeatable.
    #[arg(long, value_name = "PATTERN")]
    exclude: Vec<String>,
}

#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    Show(ConfigShowArgs),
    Set(ConfigSetArgs),
    Reset(ConfigShowArgs),
}

#[derive(Args)]
struct ConfigShowArgs {
    #[command(flatten)]
    selection: ProfileSelection,
}

#[derive(Args)]
struct ConfigSetArgs {
    #[command(flatten)]
    selection: ProfileSelection,
    /// URL prefix to click on; pass an empty string to match every page.
    #[arg(long)]
    url: Option<String>,
    /// Seconds between clicks. Invalid or non-positive values become 5.
    #[arg(long, allow_hyphen_values = true)]
    interval: Option<String>,
    /// `id` attribute of the element to click.
    #[arg(long = "button-id", value_name = "ID")]
    button_id: Option<String>,
}

#[derive(Args)]
struct ProfileArgs {
    #[command(subcommand)]
    command: ProfileCommand,
}

#[derive(Subcommand)]
enum ProfileCommand {
    /// Print where a profile keeps its data.
    Path(ConfigShowArgs),
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    crate::logging::init();
    match cli.command {
        Commands::Run(args) => run_browser(args),
        Commands::Config(args) => run_config(args),
        Commands::Profile(args) => run_profile(args),
    }
}

fn run_browser(args: RunArgs) -> Result<(), Box<dyn Error>> {
    let profile = args.selection.resolve()?;
    let config = RunConfig {
        start_url: args.url,
        profile,
        browser_override: args.browser,
        store_override: args.selection.store,
        headless: args.headless,
        ephemeral: args.ephemeral,
        filter: UrlFilter::new(args.matches, args.exclude),
    };
    crate::host::run(config)
}

fn run_config(args: ConfigArgs) -> Result<(), Box<dyn Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    match args.command {
        ConfigCommand::Show(a) => {
            let store = open_config_store(&a.selection)?;
            let config = rt
                .block_on(store.try_load())
                .map_err(|e| -> Box<dyn Error> { e })?;
            print_config(&config)
        }
        ConfigCommand::Set(a) => {
            let store = open_config_store(&a.selection)?;
            let current = rt
                .block_on(store.try_load())
                .map_err(|e| -> Box<dyn Error> { e })?;
            let updated = apply_overrides(
                current,
                a.url.as_deref(),
                a.interval.as_deref(),
                a.button_id.as_deref(),
            );
            rt.block_on(store.try_save(&updated))
                .map_err(|e| -> Box<dyn Error> { e })?;
            print_config(&updated)
        }
        ConfigCommand::Reset(a) => {
            let store = open_config_store(&a.selection)?;
            let defaults = Configuration::default();
            rt.block_on(store.try_save(&defaults))
                .map_err(|e| -> Box<dyn Error> { e })?;
            eprintln!("Configuration reset.");
            print_config(&defaults)
        }
    }
}

fn run_profile(args: ProfileArgs) -> Result<(), Box<dyn Error>> {
    match args.command {
        ProfileCommand::Path(a) => {
            let paths = a.selection.resolve()?;
            println!("profile: {}", paths.name);
            println!("root:    {}", paths.root.display());
            println!("browser: {}", paths.browser_dir.display());
            println!("store:   {}", a.selection.store_path()?.display());
            Ok(())
        }
    }
}

fn open_config_store(selection: &ProfileSelection) -> Result<ConfigStore, Box<dyn Error>> {
    let path = selection.store_path()?;
    Ok(ConfigStore::new(Arc::new(JsonFileStore::new(path))))
}

/// Apply CLI edits with the same trimming and coercion as the popup.
fn apply_overrides(
    mut config: Configuration,
    url: Option<&str>,
    interval: Option<&str>,
    button_id: Option<&str>,
) -> Configuration {
    if let Some(url) = url {
        config.target_url_prefix = url.trim().to_string();
    }
    if let Some(interval) = interval {
        config.interval_seconds = parse_interval(interval);
    }
    if let Some(button_id) = button_id {
        config.element_id = button_id.trim().to_string();
    }
    config
}

fn print_config(config: &Configuration) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
