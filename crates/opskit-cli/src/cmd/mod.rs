pub mod doctor;
pub mod key;
pub mod maintain;
pub mod mirror;
pub mod shortcuts;
pub mod tree;
pub mod tune;
pub mod workflow;
