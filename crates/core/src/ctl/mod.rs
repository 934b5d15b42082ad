pub mod params;
pub mod protocol;

mod server;

pub use params::ParamStore;
pub use server::CtlServer;
