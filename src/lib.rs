#![no_std]

#[cfg(test)]
extern crate std;

pub mod hx711;
pub mod mass;
pub mod scale;
pub mod source;

mod utils;
