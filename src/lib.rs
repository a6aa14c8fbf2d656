//! # checkin-harvest
//!
//! Daily reward automation for multi-account sign-in sites.
//!
//! | Module | Role |
//! |--------|------|
//! | [`pow`] | SHA-256 leading-zero nonce solver, sharded over rayon |
//! | [`calibrate`] | local hash-rate measurement reported to the PoW site |
//! | [`progress`] | solver attempt counters and periodic status lines |
//! | [`checkin`] | PoW check-in protocol state machine |
//! | [`harvest`] | draw-until-exhausted iterator and its two providers |
//! | [`creditspin`] | one daily spin credited to a bearer-token account |
//! | [`orchestrator`] | runs a job over every account with failure isolation |
//! | [`digest`] | result digest and the notification gate |
//! | [`report`] | summary text and exit codes |
//!
//! Collaborators sit behind traits: [`session::SessionProvider`],
//! [`transport::Transport`] / [`transport::Connector`], [`store::DigestStore`]
//! and [`notify::Notifier`].

pub mod calibrate;
pub mod checkin;
pub mod config;
pub mod creditspin;
pub mod digest;
pub mod error;
pub mod harvest;
pub mod notify;
pub mod orchestrator;
pub mod pow;
pub mod progress;
pub mod report;
pub mod results;
pub mod session;
pub mod store;
pub mod transport;

pub use error::{EngineError, EngineResult};
