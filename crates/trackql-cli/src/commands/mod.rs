pub mod create;
pub mod delete;
pub mod get;
pub mod render;
pub mod search;
pub mod update;
