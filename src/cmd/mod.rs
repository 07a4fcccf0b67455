//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled                                        |
//! |-----------|---------------------------------------------------------|
//! | `serve`   | `Serve`                                                 |
//! | `board`   | `Board`, `Move`, `Edit`, `Book`, `Services`, `Clients`  |
//! | `watch`   | `Watch`                                                 |
//! | `config`  | `Config`                                                |

pub mod board;
pub mod config;
pub mod serve;
pub mod watch;

pub use board::{
    cmd_board, cmd_book, cmd_clients, cmd_edit, cmd_move, cmd_services, parse_booking,
};
pub use config::cmd_config;
pub use serve::cmd_serve;
pub use watch::cmd_watch;
