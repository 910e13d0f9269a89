pub mod data_model;
pub mod file_config;

pub use data_model::{
    ConfigFile, DialMode, EmsEncoding, GnmiEncoding, GnmiStreamMode, GnmiSubscriptionMode,
    InputConfig, InputFormat, OutputConfig, RuntimeConfig, SinkAuth, SinkKind, SubscriptionConfig,
};
pub use file_config::load_from_file;
