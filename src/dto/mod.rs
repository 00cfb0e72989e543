pub mod admin;
pub mod challenge;
pub mod completion;
pub mod health;
pub mod stats;
pub mod subscription;
pub mod validation;
