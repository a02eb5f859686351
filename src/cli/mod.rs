pub mod cache_cmd;
pub mod config_cmd;
pub mod daily_cmd;
pub mod output;
pub mod renderer;
