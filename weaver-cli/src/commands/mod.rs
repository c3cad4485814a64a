pub mod apply;
pub mod daemon;
pub mod init;
pub mod parse;
