#[cfg(test)]
#[macro_use]
extern crate assert_approx_eq;

#[macro_use]
extern crate log;

mod cancel;
mod controller;
mod envelope;
mod error;
mod motion;
mod port;
mod speed;

pub use cancel::*;
pub use controller::*;
pub use envelope::*;
pub use error::*;
pub use motion::*;
pub use port::*;
pub use speed::*;
