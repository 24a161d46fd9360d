//! Live tweets and their time-decaying reaction rates

pub mod bank;
pub mod observation;
pub mod transmission;
pub mod tweet;

pub use bank::TweetBank;
pub use observation::ObservationModel;
pub use transmission::TransmissionParams;
pub use tweet::{Tweet, TweetContent};
