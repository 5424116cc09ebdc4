//! `navmeshtool` commands.

pub mod common;
pub mod db;
pub mod generate;
