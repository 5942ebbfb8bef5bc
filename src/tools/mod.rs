pub mod capi;
pub mod cilium;
pub mod exec;
pub mod kind;
pub mod plan;
