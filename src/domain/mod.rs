mod error;
mod invoice;
mod ledger;
mod mapper;
mod money;
mod session;
mod tax;

pub use error::*;
pub use invoice::*;
pub use ledger::*;
pub use mapper::*;
pub use money::*;
pub use session::*;
pub use tax::*;
