pub mod csv_log;
pub mod telegram;
pub mod vendista;
