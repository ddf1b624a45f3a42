#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod cohort;
pub mod comparison;
pub mod econ;
pub mod error;
pub mod linalg;
pub mod multi;
pub mod outcomes;
pub mod params;
pub mod patient;
pub mod progress;
pub mod psa;
pub mod sampler;
pub mod states;
pub mod stats;
pub mod transition;
