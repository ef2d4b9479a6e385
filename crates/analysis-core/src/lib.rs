pub mod adaptive;
pub mod error;
pub mod symbol;
pub mod traits;
pub mod types;

pub use error::*;
pub use symbol::*;
pub use traits::*;
pub use types::*;
