//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module       | Commands handled          |
//! |--------------|---------------------------|
//! | `sites`      | `Sites`                   |
//! | `settings`   | `Settings`                |
//! | `containers` | `Containers`              |
//! | `wp`         | `Wp`                      |
//! | `xdebug`     | `Xdebug`                  |
//! | `app`        | `Open`, `Info`            |
//! | `output`     | shared event rendering    |

pub mod app;
pub mod containers;
pub mod output;
pub mod settings;
pub mod sites;
pub mod wp;
pub mod xdebug;

pub use app::{cmd_info, cmd_open};
pub use containers::cmd_containers;
pub use settings::cmd_settings;
pub use sites::cmd_sites;
pub use wp::cmd_wp;
pub use xdebug::cmd_xdebug;
