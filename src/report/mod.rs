pub mod console;
pub mod history;
