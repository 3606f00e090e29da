mod tour;
mod user;

pub use tour::*;
pub use user::*;
