#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
pub mod config;
pub mod io;
pub mod runner;

#[path = "../prepare/mod.rs"]
pub mod prepare;

#[path = "../learn/mod.rs"]
pub mod learn;
