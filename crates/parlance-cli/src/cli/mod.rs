//! CLI entry and dispatch.

use std::io::{self, BufReader, IsTerminal as _, Write as _};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use parlance_core::capability::{EnvProbe, negotiate};
use parlance_core::config::ModeSetting;
use parlance_core::{ChatView, ColorMode, Config, ThemeManager};
use parlance_tui::RuntimeOptions;

mod logging;
mod transcript;

#[derive(Parser, Debug)]
#[command(name = "parlance")]
#[command(version)]
#[command(about = "Render markdown chat transcripts in the terminal")]
struct Cli {
    /// Transcript (.toml) or markdown files; `-` reads markdown from stdin
    #[arg(value_name = "FILES")]
    files: Vec<PathBuf>,

    /// Print the rendered transcript as plain text instead of opening the viewer
    #[arg(long)]
    print: bool,

    /// Stream messages from stdin into the open viewer (`@@ user` / `@@ assistant` start a message)
    #[arg(long, conflicts_with = "print")]
    follow: bool,

    /// Line width for --print
    #[arg(long, default_value_t = 80, requires = "print")]
    width: u16,

    /// Theme pair name (ocean, solarized, eighties, mocha)
    #[arg(long)]
    theme: Option<String>,

    /// Start in light mode
    #[arg(long, conflicts_with = "dark")]
    light: bool,

    /// Start in dark mode
    #[arg(long)]
    dark: bool,

    /// Messages from the end that still count as "at the bottom"
    #[arg(long, value_name = "N")]
    lookback: Option<usize>,

    /// Disable inline images
    #[arg(long = "no-images")]
    no_images: bool,

    /// Config file to use instead of $PARLANCE_HOME/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log to stderr instead of the log file
    #[arg(long = "log-stderr")]
    log_stderr: bool,
}

impl Cli {
    /// Flags win over the config file.
    fn apply(&self, config: &mut Config) {
        if let Some(theme) = &self.theme {
            config.theme.clone_from(theme);
        }
        if self.light {
            config.mode = ModeSetting::Light;
        } else if self.dark {
            config.mode = ModeSetting::Dark;
        }
        if let Some(lookback) = self.lookback {
            config.scroll.lookback = lookback;
        }
        if self.no_images {
            config.images.enabled = false;
        }
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.log_stderr)?;

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load config")?;
    cli.apply(&mut config);

    if cli.follow {
        if cli.files.iter().any(|f| f.as_os_str() == "-") {
            anyhow::bail!("--follow already reads stdin; drop the `-` argument");
        }
        if io::stdin().is_terminal() {
            anyhow::bail!("--follow needs piped stdin");
        }
    }
    let transcript = if cli.follow && cli.files.is_empty() {
        transcript::Transcript::default()
    } else {
        transcript::load(&cli.files, io::stdin().lock()).context("Failed to load transcript")?
    };
    let base_dir = transcript.base_dir.clone();
    let log = transcript.into_log();
    let themes = theme_manager(&config, cli.print);

    if cli.print {
        let mut view = ChatView::default();
        if let Some(dir) = base_dir {
            view = view.with_base_dir(dir);
        }
        let mut out = io::stdout().lock();
        for line in view.render_plain(&log, &themes, cli.width) {
            writeln!(out, "{line}").context("Failed to write output")?;
        }
        return Ok(());
    }

    let capabilities = negotiate(&EnvProbe::from_env())
        .with_overrides(config.links.osc8.as_override(), config.images.enabled);
    let options = RuntimeOptions {
        capabilities,
        image_options: config.images.options(),
        lookback: config.scroll.lookback,
        feedback_duration: config.feedback.duration(),
        base_dir,
    };

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let feed = cli
        .follow
        .then(|| parlance_tui::spawn_reader(rt.handle(), BufReader::new(io::stdin())));
    let result = parlance_tui::run_interactive(log, themes, options, rt.handle().clone(), feed);
    // The stdin reader may still be blocked on a read.
    rt.shutdown_background();
    result
}

/// Builds the theme manager from config. Printing skips `COLORFGBG`
/// detection unless a mode was asked for.
fn theme_manager(config: &Config, print: bool) -> ThemeManager {
    let mode = match (config.mode, print) {
        (ModeSetting::Auto, true) => ColorMode::Dark,
        (mode, _) => mode.resolve(),
    };
    let mut themes = ThemeManager::builtin(mode);
    if !themes.select(&config.theme) {
        tracing::warn!(
            theme = %config.theme,
            fallback = %themes.pair().name,
            "unknown theme"
        );
    }
    themes
}
