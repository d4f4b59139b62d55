mod client;
mod descriptor;
mod dialect;
mod expr;
mod lowering;
mod mapping;
mod scope;
mod session;
mod statement;
mod transaction;
mod util;
mod value;

pub use ::anyhow::Context;
pub use client::*;
pub use descriptor::*;
pub use dialect::*;
pub use expr::*;
pub use lowering::*;
pub use mapping::*;
pub use scope::*;
pub use session::*;
pub use statement::*;
pub use transaction::*;
pub use util::*;
pub use value::*;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
