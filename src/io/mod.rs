mod export;
mod overrides;
mod upload;

pub use export::*;
pub use overrides::*;
pub use upload::*;
