//! Level-up and death alerts for characters of the Cyleria web game.
//!
//! Subscriptions live in a [`store::StateStore`]; the [`monitor::PollScheduler`]
//! re-reads every subscribed profile on a fixed cadence and hands alerts to a
//! [`notification::Notifier`].

pub mod app;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod notification;
pub mod store;
pub mod subscription;
pub mod watchlist;

pub use error::{Error, Result};
