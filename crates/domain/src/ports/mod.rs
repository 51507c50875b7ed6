pub mod application_manager;
pub mod transport;

pub use application_manager::ApplicationManager;
pub use transport::Transport;
