pub mod contracts;
pub mod generator;
pub mod log;
pub mod oracle;
pub mod sequence;
pub mod server;
