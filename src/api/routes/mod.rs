pub mod health;
pub mod listing;
pub mod update;
pub mod value;
