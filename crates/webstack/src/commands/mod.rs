pub mod down;
pub mod plan;
pub mod script;
pub mod synth;
pub mod up;
pub mod validate;
