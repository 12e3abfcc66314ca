pub mod control;
pub mod open;
pub mod status;
