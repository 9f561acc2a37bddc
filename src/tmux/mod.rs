mod client;
mod focus;

pub use client::TmuxClient;
pub use focus::focus_session;
