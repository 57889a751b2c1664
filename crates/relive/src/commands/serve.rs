//! `relive serve` command implementation.

use std::path::PathBuf;

use clap::Args;
use relive_config::{CliSettings, Config};
use relive_server::{ConfigSource, run_server, server_config_from_config};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the serve command.
#[derive(Args)]
pub(crate) struct ServeArgs {
    /// Path to configuration file (default: auto-discover relive.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory to serve (overrides config).
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Host to bind to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory to watch for changes (overrides config).
    #[arg(long, conflicts_with = "no_watch")]
    watch_path: Option<PathBuf>,

    /// Watch files for changes (default: enabled).
    #[arg(long)]
    watch: Option<bool>,

    /// Do not watch files; browsers only reload on restart.
    #[arg(long, conflicts_with = "watch")]
    no_watch: bool,

    /// Enable live reload (default: enabled).
    #[arg(long)]
    live_reload: Option<bool>,

    /// Disable live reload.
    #[arg(long, conflicts_with = "live_reload")]
    no_live_reload: bool,

    /// Build command argument, repeat for each argument (overrides config).
    #[arg(long = "build-command", value_name = "ARG")]
    build_command: Vec<String>,

    /// Enable verbose output (request, channel and build logs).
    #[arg(short, long)]
    pub verbose: bool,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the server fails to start.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = self.cli_settings();
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        output.highlight(&format!(
            "Serving on http://{}:{}",
            config.server.host, config.server.port
        ));
        output.field("Root", &config.site_resolved.root.display().to_string());

        let live_reload = &config.live_reload_resolved;
        if !live_reload.enabled {
            output.field("Live reload", "disabled");
        } else if let Some(watch_path) = &live_reload.watch_path {
            output.field("Watching", &watch_path.display().to_string());
        } else {
            output.field("Live reload", "enabled (not watching)");
        }

        if let Some(build) = &config.build_resolved {
            output.field("Build", &build.command.join(" "));
        }

        if let Some(path) = &config.config_path {
            output.field("Config", &path.display().to_string());
        }
        output.info("Press Ctrl+C to stop");

        let source = config.config_path.clone().map(|path| ConfigSource {
            path,
            settings: cli_settings,
        });

        run_server(server_config_from_config(&config), source)
            .await
            .map_err(|e| CliError::Server(e.to_string()))?;

        Ok(())
    }

    /// Build config overrides from the parsed flags.
    fn cli_settings(&self) -> CliSettings {
        CliSettings {
            host: self.host.clone(),
            port: self.port,
            root: self.root.clone(),
            live_reload_enabled: self.resolve_live_reload_enabled(),
            watch: self.resolve_watch(),
            watch_path: self.watch_path.clone(),
            build_command: (!self.build_command.is_empty()).then(|| self.build_command.clone()),
        }
    }

    /// Resolve `watch` from --watch/--no-watch flags.
    fn resolve_watch(&self) -> Option<bool> {
        self.no_watch.then_some(false).or(self.watch)
    }

    /// Resolve `live_reload_enabled` from --live-reload/--no-live-reload flags.
    fn resolve_live_reload_enabled(&self) -> Option<bool> {
        self.no_live_reload.then_some(false).or(self.live_reload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: ServeArgs,
    }

    fn parse(args: &[&str]) -> ServeArgs {
        let argv = std::iter::once("relive-serve").chain(args.iter().copied());
        TestCli::try_parse_from(argv).unwrap().args
    }

    #[test]
    fn test_no_flags_no_overrides() {
        let settings = parse(&[]).cli_settings();

        assert_eq!(settings.host, None);
        assert_eq!(settings.port, None);
        assert_eq!(settings.root, None);
        assert_eq!(settings.live_reload_enabled, None);
        assert_eq!(settings.watch, None);
        assert_eq!(settings.build_command, None);
    }

    #[test]
    fn test_overrides() {
        let settings = parse(&[
            "--host",
            "0.0.0.0",
            "--port",
            "3000",
            "--root",
            "public",
            "--watch-path",
            "src",
        ])
        .cli_settings();

        assert_eq!(settings.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(settings.port, Some(3000));
        assert_eq!(settings.root, Some(PathBuf::from("public")));
        assert_eq!(settings.watch_path, Some(PathBuf::from("src")));
    }

    #[test]
    fn test_no_watch_and_no_live_reload() {
        let settings = parse(&["--no-watch", "--no-live-reload"]).cli_settings();

        assert_eq!(settings.watch, Some(false));
        assert_eq!(settings.live_reload_enabled, Some(false));
    }

    #[test]
    fn test_watch_explicit_value() {
        let settings = parse(&["--watch", "true"]).cli_settings();
        assert_eq!(settings.watch, Some(true));
    }

    #[test]
    fn test_watch_conflicts_with_no_watch() {
        let argv = ["relive-serve", "--watch", "true", "--no-watch"];
        assert!(TestCli::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_live_reload_explicit_value() {
        let settings = parse(&["--live-reload", "false"]).cli_settings();
        assert_eq!(settings.live_reload_enabled, Some(false));
    }

    #[test]
    fn test_build_command_collects_arguments() {
        let settings =
            parse(&["--build-command", "npm", "--build-command", "run", "--build-command", "build"])
                .cli_settings();

        assert_eq!(
            settings.build_command,
            Some(vec!["npm".to_owned(), "run".to_owned(), "build".to_owned()])
        );
    }

    #[test]
    fn test_watch_path_conflicts_with_no_watch() {
        let argv = ["relive-serve", "--watch-path", "src", "--no-watch"];
        assert!(TestCli::try_parse_from(argv).is_err());
    }
}
