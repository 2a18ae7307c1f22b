pub mod checkpoint;
pub mod eta;
pub mod event;
pub mod issue;
pub mod position;
pub mod session;
pub mod status;
