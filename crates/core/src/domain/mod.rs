pub mod action;
pub mod leave;
pub mod session;
