mod ipc;
mod process;

pub use ipc::{read_message, write_message, IpcError, Message};
pub use process::{run, WorkerConfig};
