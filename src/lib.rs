pub mod api;
pub mod config;
pub mod containers;
pub mod context;
pub mod errors;
pub mod events;
pub mod exec;
pub mod hosts;
pub mod logging;
pub mod poller;
pub mod proxy;
pub mod site;
pub mod store;
pub mod xdebug;

pub use api::DevwpApi;
pub use context::AppContext;
pub use errors::{DevwpError, Result};
