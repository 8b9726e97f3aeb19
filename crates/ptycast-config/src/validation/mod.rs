//! Full configuration validation.
//!
//! Each section has its own validator; this orchestrator calls them all
//! and collects errors into a single `ConfigError`.

mod helpers;


use crate::schema::PtycastConfig;
use helpers::{validate_non_empty, validate_range};
use ptycast_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &PtycastConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_server(&mut errors, config);
    validate_launch(&mut errors, config);
    validate_relay(&mut errors, config);
    validate_session_log(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_server(errors: &mut Vec<String>, config: &PtycastConfig) {
    let server = &config.server;
    validate_non_empty(errors, "server.host", &server.host);
    validate_range(errors, "server.port", u64::from(server.port), 1, 65_535);
    validate_range(
        errors,
        "server.max_message_size",
        server.max_message_size as u64,
        1024,
        64 * 1024 * 1024,
    );
    validate_range(errors, "server.keepalive_secs", server.keepalive_secs, 0, 3600);
    validate_range(
        errors,
        "server.keepalive_timeout_secs",
        server.keepalive_timeout_secs,
        0,
        3600,
    );
    validate_range(errors, "server.send_timeout_ms", server.send_timeout_ms, 1, 60_000);
    validate_range(
        errors,
        "server.outbound_capacity",
        server.outbound_capacity as u64,
        1,
        65_536,
    );
}

fn validate_launch(errors: &mut Vec<String>, config: &PtycastConfig) {
    let launch = &config.launch;
    validate_non_empty(errors, "launch.program", &launch.program);
    validate_range(errors, "launch.cols", u64::from(launch.cols), 1, 1000);
    validate_range(errors, "launch.rows", u64::from(launch.rows), 1, 1000);
    if let Some(marker) = &launch.marker_file {
        validate_non_empty(errors, "launch.marker_file", marker);
    }
}

fn validate_relay(errors: &mut Vec<String>, config: &PtycastConfig) {
    let relay = &config.relay;
    validate_range(errors, "relay.read_chunk", relay.read_chunk as u64, 1, 1 << 20);
    validate_range(errors, "relay.poll_interval_ms", relay.poll_interval_ms, 1, 10_000);
    validate_range(
        errors,
        "relay.message_capacity",
        relay.message_capacity as u64,
        1,
        1_000_000,
    );
    validate_range(
        errors,
        "relay.command_capacity",
        relay.command_capacity as u64,
        1,
        1_000_000,
    );
    validate_range(errors, "relay.command_timeout_ms", relay.command_timeout_ms, 1, 10_000);
    validate_range(errors, "relay.terminate_grace_secs", relay.terminate_grace_secs, 0, 600);
    validate_range(errors, "relay.error_backoff_ms", relay.error_backoff_ms, 0, 60_000);
}

fn validate_session_log(errors: &mut Vec<String>, config: &PtycastConfig) {
    let log = &config.session_log;
    if !log.enabled {
        return;
    }
    validate_non_empty(errors, "session_log.path", &log.path);
    validate_range(errors, "session_log.max_bytes", log.max_bytes, 1024, u64::MAX);
    validate_range(errors, "session_log.keep", log.keep as u64, 0, 100);
}
