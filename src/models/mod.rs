// Wire models for the HTTP workload bindings

pub mod generate;
pub mod openai;
