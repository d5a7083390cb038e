//! SOCKS5 protocol
//!
//! Wire codec, the per-connection server state machine, the accept loop
//! and the client. Only CONNECT is executed; BIND and UDP ASSOCIATE are
//! decoded and answered with "command not supported".

pub mod addr;
pub mod auth;
pub mod client;
pub mod command;
pub mod consts;
pub mod server;
pub mod session;
pub mod types;

pub use addr::{AddrKind, Address};
pub use client::{negotiate, Socks5Client};
pub use command::{build_reply, read_request, Request};
pub use server::Socks5Server;
pub use session::{run_session, SessionEnd, Timeouts};
pub use types::{Method, Reply, SocksCommand};
