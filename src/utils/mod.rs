//! Utility modules for the traffic guard.
//! This module contains common utilities used across the application.

mod logging;
mod error;

pub use logging::{
    init_logging,
    create_request_span,
    log_ban_issued,
    log_autowhitelist_match,
    log_rejected_observation,
    log_job_event,
};

pub use error::{GuardError, GuardResult};
