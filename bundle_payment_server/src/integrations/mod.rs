pub mod telco;

pub use telco::{TelcoGateway, TelcoProvider};
