pub mod credit;
pub mod job;
pub mod message;
pub mod payment;
pub mod plan;
pub mod project;
pub mod signup;
pub mod subscription;
pub mod user;
