// src/lib.rs
pub mod ports {
    pub mod replay_feed;
}
pub mod config;
pub mod pairtrade;
pub mod pnl_log;
pub mod runner;
