pub mod status_poller;

pub use status_poller::{PollHandle, StatusPoller, StatusPollerConfig};
