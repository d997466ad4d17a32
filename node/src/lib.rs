pub mod bootstrap;

pub use bootstrap::{TcpLink, TcpRank, join_chain, link_up};
