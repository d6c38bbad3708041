/// Frame pacing - bounds how many frames the GPU may have in flight

pub mod frame_gate;

pub use frame_gate::*;
