pub mod camera;
pub mod conf;
pub mod monitor;
pub mod presence;
pub mod sampler;
pub mod session;
pub mod signal;
pub mod store;
