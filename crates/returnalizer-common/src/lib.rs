pub mod error;
pub mod series;
pub mod stat;
pub mod value;

pub use error::*;
pub use series::*;
pub use stat::*;
pub use value::*;
