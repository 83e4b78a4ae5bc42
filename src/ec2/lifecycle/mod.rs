//! Per-operation EC2 API calls and response mapping.

mod address;
mod create;
mod describe;
mod image;
mod tag;
