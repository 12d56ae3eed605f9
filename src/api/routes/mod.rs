pub mod health;
pub mod update;
pub mod value;
