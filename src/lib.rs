pub mod arg_parser;
pub mod command;
pub mod config;
pub mod console;
pub mod dependency;
pub mod dispatch;
pub mod errors;
pub mod gpu_devices;
pub mod logger;
pub mod oc_tool;
pub mod param_file;
pub mod privilege;
pub mod service_manager;
pub mod setup;
pub mod unit_template;
