pub mod command;
pub mod common;
pub mod config;
pub mod data_frame;
pub mod etr;
pub mod header;
pub mod parser;
pub mod phasors;
pub mod signature;
pub mod tags;
pub mod timetag;
pub mod units;
pub mod utils;
