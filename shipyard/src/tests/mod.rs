mod config;
mod host;
mod mock;
mod version;
