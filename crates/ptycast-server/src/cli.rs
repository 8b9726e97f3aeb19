use std::path::PathBuf;

use clap::Parser;
use ptycast_config::PtycastConfig;

/// ptycast: share one PTY-attached process with many WebSocket clients.
#[derive(Parser, Debug, Default)]
#[command(name = "ptycast", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind (defaults to loopback).
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log level override (debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Working directory for the child, replacing the configured candidates.
    #[arg(short = 'd', long)]
    pub workdir: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    pub print_config: bool,

    /// Command to run instead of the configured program.
    #[arg(last = true)]
    pub command: Vec<String>,
}

impl Args {
    /// Overlay command-line overrides onto a loaded config.
    pub fn apply(&self, config: &mut PtycastConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(dir) = &self.workdir {
            config.launch.working_dir_candidates = vec![dir.display().to_string()];
            config.launch.marker_file = None;
        }
        if let Some((program, args)) = self.command.split_first() {
            config.launch.program = program.clone();
            config.launch.args = args.to_vec();
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_command_replaces_program() {
        let args =
            Args::try_parse_from(["ptycast", "--port", "9000", "--", "make", "mcp_Adder"])
                .unwrap();
        let mut config = PtycastConfig::default();
        args.apply(&mut config);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.launch.program, "make");
        assert_eq!(config.launch.args, vec!["mcp_Adder".to_string()]);
    }

    #[test]
    fn workdir_overrides_candidates_and_marker() {
        let args = Args::try_parse_from(["ptycast", "-d", "/srv/agent"]).unwrap();
        let mut config = PtycastConfig::default();
        config.launch.working_dir_candidates = vec!["../UCAgent".into()];
        config.launch.marker_file = Some("Makefile".into());
        args.apply(&mut config);
        assert_eq!(config.launch.working_dir_candidates, vec!["/srv/agent".to_string()]);
        assert!(config.launch.marker_file.is_none());
    }

    #[test]
    fn no_flags_leave_config_untouched() {
        let args = Args::try_parse_from(["ptycast"]).unwrap();
        let mut config = PtycastConfig::default();
        args.apply(&mut config);
        assert_eq!(config.server.bind_addr(), "127.0.0.1:8080");
        assert_eq!(config.launch.program, "/bin/sh");
    }
}
