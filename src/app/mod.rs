pub mod classify_use_case;
pub mod ports;
