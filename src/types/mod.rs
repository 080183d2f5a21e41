pub mod bar;
pub mod signals;
pub mod status;

pub use bar::*;
pub use signals::*;
pub use status::*;
