//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# ptycast configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[server]
# host = "127.0.0.1"
# port = 8080
# max_message_size = 1048576
# keepalive_secs = 20        # 0 disables server pings
# keepalive_timeout_secs = 40  # drop clients silent this long; 0 never drops
# send_timeout_ms = 1000
# outbound_capacity = 256

[launch]
# program = "/bin/sh"
# args = []
# working_dir_candidates = ["../UCAgent", "./UCAgent", "../../UCAgent"]
# marker_file = "Makefile"
# cols = 80
# rows = 24
# initial_input = "continue"
# initial_input_delay_ms = 2000
# pid_file = "output/.agent.pid"

[launch.env]
# TERM = "xterm-256color"

[relay]
# read_chunk = 1024
# poll_interval_ms = 100
# message_capacity = 1000
# command_capacity = 1000
# command_timeout_ms = 100
# terminate_grace_secs = 5
# acknowledge_commands = true
# error_backoff_ms = 500

[session_log]
# enabled = true
# path = "output/ws.log"
# max_bytes = 5242880
# keep = 3
"##
    .to_string()
}
