pub mod filling;
pub mod histogram1d;
pub mod utility;
