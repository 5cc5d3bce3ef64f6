pub mod errors;
pub mod forms;
pub mod poller;
pub mod remote;
pub mod services;
pub mod traits;
