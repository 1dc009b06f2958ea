#![allow(stable_features)]
#![allow(incomplete_features)]
#![feature(thread_local)]
#![feature(test)]

extern crate test;

#[macro_use]
extern crate log;

#[allow(dead_code)]
mod constants;

pub mod access;
pub mod addr;
pub mod atomics;
pub mod config;
pub mod diagnosis;
pub mod engine;
pub mod hooks;
pub mod registry;
pub mod report;
mod shadow;
pub mod tid;

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub use crate::access::{AccessKind, LineShadow, PageShadow};
pub use crate::config::Config;
pub use crate::diagnosis::callsite::CallSiteTable;
pub use crate::diagnosis::object::ObjectDiagnosis;
pub use crate::engine::{Engine, ENGINE};
pub use crate::registry::{ObjectInfo, Registry};
