pub mod traits;
pub mod anthropic;
pub mod google;

pub use traits::*;
pub use anthropic::*;
pub use google::*;
