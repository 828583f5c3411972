pub mod fps;
pub mod models;
pub mod parser;
