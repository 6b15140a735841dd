pub mod history;
pub mod tools;
