//! PTY side of the relay.
//!
//! Owns the terminal pair and the child started on it, and runs the two
//! OS threads that touch the master: the output reader (master → internal
//! channel) and the command writer (command queue → master).

pub mod handle;
pub mod queue;
pub mod reader;
pub mod spawn;
pub mod supervisor;
pub mod types;
pub mod worker;

pub use handle::{PtyHandle, PtyWriter};
pub use queue::{
    command_queue, spawn_command_writer, CommandQueue, CommandReceiver, CommandWriter,
    WriterOptions, PROCESS_NOT_RUNNING,
};
pub use reader::{
    spawn_output_reader, MasterReader, OutputReader, PtySource, ReaderOptions, SESSION_ENDED,
};
pub use spawn::{resolve_working_dir, start, start_with_fallback, PtySession};
pub use supervisor::{Supervisor, Termination};
pub use types::LaunchSpec;
pub use worker::{panic_message, run_guarded, Flow};
