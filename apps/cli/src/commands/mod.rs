//! 命令定义和实现

pub mod compile;
pub mod config;
pub mod simulate;

pub use compile::CompileCommand;
pub use config::ConfigCommand;
pub use simulate::SimulateCommand;
