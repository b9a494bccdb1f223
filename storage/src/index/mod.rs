pub mod ann;

pub use ann::LinearAnnIndex;
