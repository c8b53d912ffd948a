//! ScamProbe - tool-orchestrated scam risk assessment.
//!
//! The library plans which analysis tools to run for a URL, executes them
//! under a shared rate limit, combines their confidences into a weighted
//! scam probability and classifies it into a [`models::RiskLevel`].
//!
//! ```no_run
//! # async fn demo(investigator: scamprobe::investigation::Investigator) {
//! use scamprobe::models::Target;
//!
//! let report = investigator
//!     .investigate(Target::new("https://paypa1-verify.example.com"))
//!     .await;
//! println!("{} ({}%)", report.risk_level, report.score.normalized_probability);
//! # }
//! ```

pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod investigation;
pub mod models;
pub mod ratelimit;
pub mod report;
pub mod retry;
pub mod services;
pub mod tools;
