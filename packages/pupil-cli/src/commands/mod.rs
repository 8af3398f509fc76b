pub mod batch;
pub mod run;
pub mod tasks;
pub mod validate;
