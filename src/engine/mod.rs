pub mod checkpoints;
pub mod eta;
pub mod issues;
pub mod notify;
pub mod positions;
pub mod session;
pub mod status;
