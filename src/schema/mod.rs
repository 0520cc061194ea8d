pub mod item;
pub mod syntax_error;
pub mod textual;
