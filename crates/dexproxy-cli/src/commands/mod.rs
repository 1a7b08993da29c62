pub mod dump;
pub mod synth;
