pub mod backup;
pub mod restore;
