pub mod controller;
pub mod error;
pub mod event;
pub mod ledger;
pub mod log;
pub mod status;
pub mod telemetry;
pub mod time;
