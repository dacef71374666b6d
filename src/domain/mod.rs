pub mod status;
pub mod terminal_state;
pub mod time_format;
