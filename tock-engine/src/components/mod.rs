//! The moving parts of a face: flap cells and the power-on sequencer.

pub mod cell;
pub mod sequencer;
