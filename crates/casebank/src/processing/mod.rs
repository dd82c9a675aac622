pub mod classifier;
pub mod grouper;
pub mod patterns;
pub mod sentiment;
