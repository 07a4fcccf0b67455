//! Network adapters for the board: HTTP for reads and mutations, WebSocket for
//! live updates.

pub mod http;
pub mod ws;

pub use http::HttpBoardApi;
pub use ws::WsTransport;
