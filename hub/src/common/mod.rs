pub mod app_dirs;
pub mod http;
pub mod path_utils;
pub mod settings;
