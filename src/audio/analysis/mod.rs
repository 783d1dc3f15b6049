pub mod downsample;
pub mod peaks;
