pub mod listener;

pub use listener::PeerListener;
