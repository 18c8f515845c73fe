pub mod app;
pub mod link;
pub mod registry;
pub mod session;
pub mod ui;
pub mod view;

pub use link::{event_channel, LinkEvent, LinkEventKind, LinkEvents, LinkOptions, PeerLink};
pub use registry::ConnectionRegistry;
pub use session::{ChatSession, Flow, Intent, SessionView, Transcript};
pub use ui::UiState;
