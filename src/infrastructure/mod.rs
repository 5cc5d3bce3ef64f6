pub mod database;
pub mod entities;
pub mod openai;
pub mod repositories;
pub mod settings;
pub mod storage;
pub mod traits;
