pub mod manifest;
pub mod plugins;
pub mod serve;
