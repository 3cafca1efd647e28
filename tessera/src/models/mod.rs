mod preprocess;
mod raster;
mod recognition;
mod request;

pub use preprocess::*;
pub use raster::*;
pub use recognition::*;
pub use request::*;
