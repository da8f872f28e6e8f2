pub mod backtest;
pub mod cache_store;
pub mod decision;
pub mod error;
pub mod espn;
pub mod http_client;
pub mod league;
pub mod ledger_export;
pub mod market_data;
pub mod probability;
pub mod settlement;
pub mod synthetic_feed;
