pub mod inventory;
pub mod ownership;
pub mod procfs;
pub mod resolver;
pub mod scanner;
