pub mod args;
pub mod chunk;
pub mod nickname;
