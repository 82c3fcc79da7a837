pub mod app;
pub mod cli;
pub mod config;
pub mod enhance;
pub mod error;
pub mod input;
pub mod logging;
pub mod machine;
pub mod node;
pub mod overlay;
pub mod paths;
pub mod replay;
pub mod selection;
pub mod session;
pub mod status;

pub use app::{SelectionBubbleApp, ServiceEvent};
pub use config::{Config, ConfigManager};
pub use machine::SelectionSessionStateMachine;
