mod pipe;
mod probe;
mod strategies;

pub use pipe::PipeGuard;
pub use probe::{wait_ready, ProbeStatus};
pub use strategies::{FileProbe, PipeProbe, TcpProbe};
