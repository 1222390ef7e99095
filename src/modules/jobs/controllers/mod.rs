pub mod job_controller;

pub use job_controller::configure;
